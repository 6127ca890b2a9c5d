//! Catalog command implementation
//!
//! Prints the LSP capability catalog as JSON, optionally one group only.

use anyhow::{Result, bail};
use clap::Args;

use crate::app::App;
use crate::rpc::catalog::{CapabilityGroup, GROUPS};

#[derive(Args, Debug)]
pub struct CatalogArgs {
    /// Only this capability group (case-insensitive, e.g. "TextDocument")
    #[arg(long)]
    pub group: Option<String>,

    /// Pretty-print JSON
    #[arg(long)]
    pub pretty: bool,
}

pub fn execute(args: CatalogArgs, app: &App) -> Result<()> {
    let groups = select(args.group.as_deref())?;
    app.output.with_pretty(args.pretty).print(&groups);
    Ok(())
}

fn select(group: Option<&str>) -> Result<Vec<&'static CapabilityGroup>> {
    let Some(name) = group else {
        return Ok(GROUPS.iter().collect());
    };

    let selected: Vec<_> = GROUPS
        .iter()
        .filter(|g| g.name.eq_ignore_ascii_case(name))
        .collect();
    if selected.is_empty() {
        let known: Vec<_> = GROUPS.iter().map(|g| g.name).collect();
        bail!("Unknown capability group '{}' (known: {})", name, known.join(", "));
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_all() {
        assert_eq!(select(None).unwrap().len(), GROUPS.len());
    }

    #[test]
    fn test_select_group() {
        let groups = select(Some("window")).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "Window");

        let json = serde_json::to_value(&groups).unwrap();
        assert_eq!(json[0]["endpoints"][0]["kind"], "notification");
    }

    #[test]
    fn test_unknown_group() {
        let err = select(Some("Debugger")).unwrap_err();
        assert!(err.to_string().contains("Unknown capability group"));
    }
}
