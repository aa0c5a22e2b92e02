use super::{BuildPolicy, LifecycleOps, OperationReport};
use crate::errors::QuantlabError;
use crate::packages::{normalize_link_path, PackageResolver};

impl LifecycleOps<'_> {
    /// Register a local directory whose content is read at build time.
    ///
    /// An extension is linked as an extension; anything else as a plain
    /// package made available to the build.
    pub fn link(&self, path: &str, policy: BuildPolicy) -> Result<OperationReport, QuantlabError> {
        let ctx = self.ctx;
        ctx.ensure_writable()?;

        let dir = normalize_link_path(path);
        let resolved = PackageResolver::new(ctx).resolve_link(&dir)?;
        if ctx.is_core(&resolved.name) {
            return Err(QuantlabError::CorePackage(resolved.name));
        }

        let previous = ctx.registry().put(resolved.to_record(path))?;
        if let Some(prev) = previous {
            self.discard_cached(&prev)?;
        }
        tracing::info!(name = %resolved.name, path = %dir.display(), kind = %resolved.kind, "Linked");

        let report = OperationReport::changed(format!("{} ({})", resolved.name, dir.display()));
        Ok(self.apply_build_policy(report, policy))
    }

    /// Remove a linked record, matched by the path it was linked from or by
    /// name. Nothing linked there is a no-op.
    pub fn unlink(&self, path_or_name: &str, policy: BuildPolicy) -> Result<OperationReport, QuantlabError> {
        let ctx = self.ctx;
        ctx.ensure_writable()?;
        let registry = ctx.registry();

        let normalized = normalize_link_path(path_or_name);
        let found = match registry.find_linked(path_or_name)? {
            Some(record) => Some(record),
            None => registry.find_linked(&normalized.to_string_lossy())?,
        };

        let Some(record) = found else {
            let note = if registry.contains(path_or_name)? {
                format!("{} is installed, not linked; use uninstall", path_or_name)
            } else {
                format!("nothing is linked as {}", path_or_name)
            };
            return Ok(OperationReport::unchanged(note));
        };

        registry.remove(&record.name)?;
        tracing::info!(name = %record.name, path = %record.install_path.display(), "Unlinked");

        let report = OperationReport::changed(format!("{} ({})", record.name, record.install_path.display()));
        Ok(self.apply_build_policy(report, policy))
    }
}
