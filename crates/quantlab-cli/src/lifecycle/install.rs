use super::{BuildPolicy, LifecycleOps, OperationReport};
use crate::errors::QuantlabError;
use crate::packages::{PackageResolver, PackageSpec};

impl LifecycleOps<'_> {
    /// Install or upgrade the package named by `spec`, enabled.
    ///
    /// Core names are refused before anything is fetched when the spec names
    /// the package up front, and before anything is placed otherwise.
    pub fn install(&self, spec: &str, policy: BuildPolicy) -> Result<OperationReport, QuantlabError> {
        let ctx = self.ctx;
        ctx.ensure_writable()?;

        let parsed = PackageSpec::parse(spec)?;
        if let Some(name) = parsed.registry_name() {
            if ctx.is_core(name) {
                return Err(QuantlabError::CorePackage(name.to_string()));
            }
        }

        let fetched = PackageResolver::new(ctx).fetch(&parsed)?;
        if ctx.is_core(fetched.name()) {
            return Err(QuantlabError::CorePackage(fetched.name().to_string()));
        }

        let resolved = fetched.into_resolved(ctx)?;
        let record = resolved.to_record(spec);
        let previous = ctx.registry().put(record)?;

        let mut report = OperationReport::changed(format!("{}@{}", resolved.name, resolved.version));
        match previous {
            Some(prev) => {
                if prev.install_path != resolved.content_path {
                    self.discard_cached(&prev)?;
                }
                tracing::info!(name = %resolved.name, from = %prev.version, to = %resolved.version, "Upgraded");
                if prev.version != resolved.version {
                    report = report.with_note(format!(
                        "{} upgraded from {} to {}",
                        resolved.name, prev.version, resolved.version
                    ));
                }
            }
            None => {
                tracing::info!(name = %resolved.name, version = %resolved.version, kind = %resolved.kind, "Installed");
            }
        }

        Ok(self.apply_build_policy(report, policy))
    }
}
