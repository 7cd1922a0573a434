//! Tool registry: discovery, help and dispatch
//!
//! Tool identifiers are case-insensitive canonical names. A unique prefix
//! resolves; an ambiguous one is rejected with the candidate list rather
//! than silently picking a match.

use anyhow::Result;

use crate::session::Session;
use crate::tools;

/// Argument type tag shown in tool help.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    File,
    NewFile,
    Float,
    Integer,
    Bool,
}

impl ArgKind {
    pub fn name(self) -> &'static str {
        match self {
            ArgKind::File => "file",
            ArgKind::NewFile => "output file",
            ArgKind::Float => "float",
            ArgKind::Integer => "integer",
            ArgKind::Bool => "bool",
        }
    }
}

/// One positional argument of a tool.
#[derive(Debug, Clone)]
pub struct ArgSpec {
    pub name: &'static str,
    pub kind: ArgKind,
    pub description: &'static str,
}

/// A runnable analysis tool.
pub trait Tool {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// Ordered positional arguments, optional ones last.
    fn args(&self) -> Vec<ArgSpec>;
    fn run(&self, session: &Session, args: &[String]) -> Result<()>;
}

impl std::fmt::Debug for dyn Tool + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool").field("name", &self.name()).finish()
    }
}

/// All registered tools.
pub struct Registry {
    tools: Vec<Box<dyn Tool>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            tools: tools::all(),
        }
    }

    /// `(name, description)` pairs, sorted by name.
    pub fn list_tools(&self) -> Vec<(&'static str, &'static str)> {
        let mut list: Vec<_> = self
            .tools
            .iter()
            .map(|t| (t.name(), t.description()))
            .collect();
        list.sort_by_key(|(name, _)| *name);
        list
    }

    /// Resolve a tool by case-insensitive name or unique prefix.
    pub fn find(&self, name: &str) -> Result<&dyn Tool> {
        let query = name.to_ascii_lowercase();
        if let Some(tool) = self
            .tools
            .iter()
            .find(|t| t.name().to_ascii_lowercase() == query)
        {
            return Ok(tool.as_ref());
        }

        let matches: Vec<&dyn Tool> = self
            .tools
            .iter()
            .map(|t| t.as_ref())
            .filter(|t| t.name().to_ascii_lowercase().starts_with(&query))
            .collect();
        match matches.len() {
            0 => anyhow::bail!("no tool named '{name}'; see `hydrogrid list`"),
            1 => Ok(matches[0]),
            _ => {
                let names: Vec<&str> = matches.iter().map(|t| t.name()).collect();
                anyhow::bail!("'{name}' is ambiguous: {}", names.join(", "))
            }
        }
    }

    /// The ordered argument table of a tool.
    pub fn tool_args(&self, name: &str) -> Result<Vec<ArgSpec>> {
        Ok(self.find(name)?.args())
    }

    /// Formatted help text for one tool.
    pub fn tool_help(&self, name: &str) -> Result<String> {
        let tool = self.find(name)?;
        let mut help = format!("{}\n{}\n\nArguments:\n", tool.name(), tool.description());
        for arg in tool.args() {
            help.push_str(&format!(
                "  {:<18} {:<12} {}\n",
                arg.name,
                arg.kind.name(),
                arg.description
            ));
        }
        Ok(help)
    }

    /// Run a tool; any failure is logged as one line and mapped to a
    /// nonzero exit code.
    pub fn run_tool(&self, session: &Session, name: &str, args: &[String]) -> i32 {
        let tool = match self.find(name) {
            Ok(tool) => tool,
            Err(e) => {
                tracing::error!("{e}");
                return 2;
            }
        };
        match tool.run(session, args) {
            Ok(()) => 0,
            Err(e) => {
                tracing::error!("{}: {e}", tool.name());
                1
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse helpers shared by the tool implementations.
pub(crate) mod parse {
    use super::ArgSpec;
    use anyhow::{Context, Result};

    pub fn require<'a>(args: &'a [String], specs: &[ArgSpec], index: usize) -> Result<&'a str> {
        args.get(index)
            .map(String::as_str)
            .with_context(|| format!("missing argument '{}'", specs[index].name))
    }

    pub fn optional<'a>(args: &'a [String], index: usize) -> Option<&'a str> {
        args.get(index).map(String::as_str).filter(|s| {
            let trimmed = s.trim();
            !trimmed.is_empty() && trimmed != "not specified"
        })
    }

    pub fn float(value: &str, name: &str) -> Result<f64> {
        value
            .trim()
            .parse()
            .with_context(|| format!("'{value}' is not a valid number for '{name}'"))
    }

    pub fn integer(value: &str, name: &str) -> Result<usize> {
        value
            .trim()
            .parse()
            .with_context(|| format!("'{value}' is not a valid integer for '{name}'"))
    }

    pub fn boolean(value: &str, name: &str) -> Result<bool> {
        match value.trim().to_ascii_lowercase().as_str() {
            "t" | "true" | "yes" | "1" => Ok(true),
            "f" | "false" | "no" | "0" => Ok(false),
            other => anyhow::bail!("'{other}' is not a valid bool for '{name}'"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = Registry::new();
        assert_eq!(
            registry.find("breachdepressions").unwrap().name(),
            "BreachDepressions"
        );
        assert_eq!(
            registry.find("BREACHDEPRESSIONS").unwrap().name(),
            "BreachDepressions"
        );
    }

    #[test]
    fn test_unique_prefix_resolves() {
        let registry = Registry::new();
        assert_eq!(registry.find("fill").unwrap().name(), "FillDepressions");
    }

    #[test]
    fn test_ambiguous_prefix_rejected() {
        let registry = Registry::new();
        let err = registry.find("breach").unwrap_err().to_string();
        assert!(err.contains("ambiguous"), "got: {err}");
        assert!(err.contains("BreachDepressions"));
        assert!(err.contains("BreachStreams"));
    }

    #[test]
    fn test_unknown_tool_rejected() {
        let registry = Registry::new();
        assert!(registry.find("NoSuchTool").is_err());
    }

    #[test]
    fn test_every_tool_documents_arguments() {
        let registry = Registry::new();
        for (name, _) in registry.list_tools() {
            let args = registry.tool_args(name).unwrap();
            assert!(!args.is_empty(), "{name} lists no arguments");
            let help = registry.tool_help(name).unwrap();
            assert!(help.contains(name));
        }
    }

    #[test]
    fn test_run_unknown_tool_exit_code() {
        let registry = Registry::new();
        let session = Session::new("/tmp");
        assert_eq!(registry.run_tool(&session, "NoSuchTool", &[]), 2);
    }

    #[test]
    fn test_run_with_missing_args_fails_nonzero() {
        let registry = Registry::new();
        let session = Session::new("/tmp");
        assert_ne!(registry.run_tool(&session, "FillDepressions", &[]), 0);
    }
}
