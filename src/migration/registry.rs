//! The ordered, append-only list of migration steps.

use super::step::MigrationStep;
use rusqlite::Transaction;
use std::borrow::Cow;

/// Immutable ordered sequence of migration steps.
///
/// The step at index `i` produces schema version `i + 1`, so the registry
/// length is the version this binary expects. Once a step has shipped it must
/// never be reordered, edited or removed; new steps are only appended.
#[derive(Debug, Default)]
pub struct MigrationRegistry {
    steps: Vec<MigrationStep>,
}

impl MigrationRegistry {
    /// Starts building a registry.
    #[must_use]
    pub fn builder() -> MigrationRegistryBuilder {
        MigrationRegistryBuilder::default()
    }

    /// Returns the schema version this registry migrates to.
    #[must_use]
    pub fn target_version(&self) -> u32 {
        // SQLite stores user_version as a 32-bit integer.
        u32::try_from(self.steps.len()).unwrap_or(u32::MAX)
    }

    /// Returns the number of steps.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the registry has no steps.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns the step at a 0-based index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&MigrationStep> {
        self.steps.get(index)
    }

    /// Returns the step that produces `version` (1-based).
    #[must_use]
    pub fn step_for_version(&self, version: u32) -> Option<&MigrationStep> {
        let index = usize::try_from(version).ok()?.checked_sub(1)?;
        self.steps.get(index)
    }

    /// Iterates over steps in application order.
    pub fn iter(&self) -> impl Iterator<Item = &MigrationStep> {
        self.steps.iter()
    }
}

/// Builder for [`MigrationRegistry`].
#[derive(Debug, Default)]
pub struct MigrationRegistryBuilder {
    steps: Vec<MigrationStep>,
}

impl MigrationRegistryBuilder {
    /// Appends a step.
    #[must_use]
    pub fn step(mut self, step: MigrationStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Appends a literal SQL step.
    #[must_use]
    pub fn sql(
        self,
        description: impl Into<Cow<'static, str>>,
        sql: impl Into<Cow<'static, str>>,
    ) -> Self {
        self.step(MigrationStep::sql(description, sql))
    }

    /// Appends a procedural step.
    #[must_use]
    pub fn procedure<F>(self, description: impl Into<Cow<'static, str>>, apply: F) -> Self
    where
        F: Fn(&Transaction<'_>) -> crate::Result<()> + Send + Sync + 'static,
    {
        self.step(MigrationStep::procedure(description, apply))
    }

    /// Finishes the registry.
    #[must_use]
    pub fn build(self) -> MigrationRegistry {
        MigrationRegistry { steps: self.steps }
    }
}

impl FromIterator<MigrationStep> for MigrationRegistry {
    fn from_iter<I: IntoIterator<Item = MigrationStep>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::builder(), MigrationRegistryBuilder::step)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_registry() {
        let registry = MigrationRegistry::builder().build();
        assert!(registry.is_empty());
        assert_eq!(registry.target_version(), 0);
        assert!(registry.step_for_version(0).is_none());
        assert!(registry.step_for_version(1).is_none());
    }

    #[test]
    fn test_builder_preserves_order() {
        let registry = MigrationRegistry::builder()
            .sql("first", "SELECT 1;")
            .procedure("second", |_| Ok(()))
            .sql("third", "SELECT 3;")
            .build();

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.target_version(), 3);
        let names: Vec<_> = registry.iter().map(MigrationStep::description).collect();
        assert_eq!(names, ["first", "second", "third"]);
        assert_eq!(
            registry.step_for_version(1).map(MigrationStep::description),
            Some("first")
        );
        assert_eq!(registry.get(2).map(MigrationStep::description), Some("third"));
    }

    #[test]
    fn test_from_iterator() {
        let registry: MigrationRegistry =
            (0..4).map(|i| MigrationStep::sql(format!("step {i}"), "SELECT 1;")).collect();
        assert_eq!(registry.target_version(), 4);
    }
}
