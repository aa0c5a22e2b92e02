use super::{BuildPolicy, LifecycleOps, OperationReport};
use crate::errors::QuantlabError;
use quantlab_registry::RegistryError;

impl LifecycleOps<'_> {
    /// Remove a record and its cached content; an unknown name is a no-op
    pub fn uninstall(&self, name: &str, policy: BuildPolicy) -> Result<OperationReport, QuantlabError> {
        let ctx = self.ctx;
        ctx.ensure_writable()?;
        if ctx.is_core(name) {
            return Err(QuantlabError::CorePackage(name.to_string()));
        }

        let registry = ctx.registry();
        let record = match registry.get(name) {
            Ok(record) => record,
            Err(RegistryError::NotFound(_)) => {
                tracing::debug!(name, "Nothing to uninstall");
                return Ok(OperationReport::unchanged(format!("{} is not installed", name)));
            }
            Err(e) => return Err(e.into()),
        };

        registry.remove(name)?;
        self.discard_cached(&record)?;
        tracing::info!(name, version = %record.version, "Uninstalled");

        Ok(self.apply_build_policy(OperationReport::changed(format!("{}@{}", record.name, record.version)), policy))
    }
}
