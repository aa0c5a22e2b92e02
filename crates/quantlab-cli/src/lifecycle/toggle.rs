use super::{BuildPolicy, LifecycleOps, OperationReport};
use crate::errors::QuantlabError;
use quantlab_registry::RegistryError;

impl LifecycleOps<'_> {
    pub fn enable(&self, name: &str, policy: BuildPolicy) -> Result<OperationReport, QuantlabError> {
        self.set_enabled(name, true, policy)
    }

    /// Core packages cannot be disabled
    pub fn disable(&self, name: &str, policy: BuildPolicy) -> Result<OperationReport, QuantlabError> {
        if self.ctx.is_core(name) {
            return Err(QuantlabError::CorePackage(name.to_string()));
        }
        self.set_enabled(name, false, policy)
    }

    fn set_enabled(&self, name: &str, enabled: bool, policy: BuildPolicy) -> Result<OperationReport, QuantlabError> {
        let ctx = self.ctx;
        ctx.ensure_writable()?;
        let registry = ctx.registry();

        let record = match registry.get(name) {
            Ok(record) => record,
            Err(RegistryError::NotFound(_)) => {
                return Ok(OperationReport::unchanged(format!("{} is not installed", name)));
            }
            Err(e) => return Err(e.into()),
        };

        if !record.is_extension() {
            return Ok(OperationReport::unchanged(format!(
                "{} is a linked package, not an extension; it is always part of the build",
                name
            )));
        }

        if !registry.set_enabled(name, enabled)? {
            let state = if enabled { "enabled" } else { "disabled" };
            return Ok(OperationReport::unchanged(format!("{} is already {}", name, state)));
        }
        tracing::info!(name, enabled, "Toggled extension");

        Ok(self.apply_build_policy(OperationReport::changed(format!("{}@{}", record.name, record.version)), policy))
    }
}
