use crate::context::AppContext;
use crate::errors::QuantlabError;
use crate::lifecycle::LifecycleOps;
use crate::GlobalOpts;
use colored::Colorize;
use quantlab_logger as logger;
use quantlab_registry::ExtensionRecord;

pub fn list_extensions(linked_only: bool, opts: &GlobalOpts) -> Result<(), QuantlabError> {
    let ctx = AppContext::load(opts.app_dir.as_deref())?;
    let ops = LifecycleOps::new(&ctx);
    let records = ops.list()?;

    if linked_only {
        for record in records.iter().filter(|r| r.linked) {
            logger::print(&record.install_path.display().to_string());
        }
        return Ok(());
    }

    if records.is_empty() {
        logger::print("No extensions installed.");
        logger::print(&format!(
            "\nTo install one, run:\n  {} install <package>",
            "quantlab".bold().cyan()
        ));
    } else {
        logger::print(&format!(
            "{} {}",
            "Extensions in".bold().green(),
            ctx.paths.root().display().to_string().bold().green()
        ));
        for record in &records {
            logger::print(&format_record(record, opts.verbose > 0));
        }
    }

    let decision = ops.needs_build()?;
    if decision.needed && !records.is_empty() {
        logger::print(&format!(
            "\n{} {}",
            "Build recommended:".yellow(),
            decision.reason
        ));
    }
    Ok(())
}

fn format_record(record: &ExtensionRecord, detailed: bool) -> String {
    let state = if !record.is_extension() {
        "linked package".dimmed()
    } else if record.enabled {
        "enabled".green()
    } else {
        "disabled".red()
    };

    let mut line = format!(
        "  {} {} {}",
        record.name.bold().blue(),
        format!("v{}", record.version).dimmed(),
        state
    );
    if record.linked {
        line.push_str(&format!(" {}", format!("({})", record.install_path.display()).dimmed()));
    }
    if detailed {
        line.push_str(&format!(
            "\n      source: {} {}\n      content: {}",
            record.source,
            record.location,
            record.install_path.display()
        ));
    }
    line
}
