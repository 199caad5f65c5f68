use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rebind_engine::{
    ExpressionEvaluator, Interpreter, PassOptions, PassStatus, ValidatorRegistry, create_dependency_graph, evaluate_data_tree,
    get_dynamic_bindings, load_data_tree_file, load_validator_config, sort_dependencies,
};
use rebind_types::DataTree;
use serde_json::{Value, json};
use tracing::{debug, warn};

/// Evaluate and inspect reactive `{{ ... }}` bindings in a data tree.
#[derive(Parser, Debug)]
#[command(name = "rebind", version, about)]
struct Cli {
    /// Print compact JSON instead of pretty-printed JSON
    #[arg(long, global = true)]
    compact: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one evaluation pass and print the evaluated tree
    Evaluate {
        /// Path to the data tree document (YAML or JSON)
        tree: PathBuf,

        /// Coerce evaluated values with the configured validators
        #[arg(long)]
        parse: bool,

        /// Validator rules file; defaults to REBIND_VALIDATORS_PATH or the config directory
        #[arg(long)]
        validators: Option<PathBuf>,
    },
    /// Print the dependency edges and the evaluation order
    Graph {
        /// Path to the data tree document (YAML or JSON)
        tree: PathBuf,
    },
    /// Split a binding string into segments and expression paths
    Bindings {
        /// Raw binding string, e.g. "Hello {{User1.name}}"
        text: String,
    },
    /// Evaluate a single expression
    Eval {
        /// Expression source, e.g. "Table1.selectedRow.id + 1"
        expression: String,

        /// Data tree whose entities are in scope
        #[arg(long)]
        tree: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let Cli { compact, command } = Cli::parse();
    let output = run(command)?;
    let rendered = if compact {
        serde_json::to_string(&output)?
    } else {
        serde_json::to_string_pretty(&output)?
    };
    println!("{rendered}");
    Ok(())
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(command: Command) -> Result<Value> {
    match command {
        Command::Evaluate { tree, parse, validators } => evaluate_command(&tree, parse, validators.as_deref()),
        Command::Graph { tree } => graph_command(&load_tree(&tree)?),
        Command::Bindings { text } => Ok(serde_json::to_value(get_dynamic_bindings(&text))?),
        Command::Eval { expression, tree } => {
            let tree = match tree {
                Some(path) => load_tree(&path)?,
                None => DataTree::new(),
            };
            eval_command(&expression, &tree)
        }
    }
}

fn load_tree(path: &Path) -> Result<DataTree> {
    let tree = load_data_tree_file(path)?;
    debug!(path = %path.display(), entities = tree.len(), "loaded data tree");
    Ok(tree)
}

fn evaluate_command(tree_path: &Path, parse: bool, validators_path: Option<&Path>) -> Result<Value> {
    let tree = load_tree(tree_path)?;
    let registry = if parse {
        let config = load_validator_config(validators_path).context("could not load validator rules")?;
        debug!(rules = config.rule_count(), "loaded validator rules");
        Some(ValidatorRegistry::from_config(&config))
    } else {
        None
    };

    let output = evaluate_data_tree(&tree, &Interpreter::new(), registry.as_ref(), PassOptions { parse_values: parse });
    if let PassStatus::CycleDetected { paths } = &output.status {
        warn!(paths = ?paths, "tree was not evaluated");
    }
    Ok(serde_json::to_value(&output)?)
}

fn graph_command(tree: &DataTree) -> Result<Value> {
    let graph = create_dependency_graph(tree);
    let mut output = json!({ "edges": &graph });
    match sort_dependencies(&graph) {
        Ok(order) => output["order"] = json!(order),
        Err(cycle) => output["cycle"] = json!(cycle.paths),
    }
    Ok(output)
}

fn eval_command(expression: &str, tree: &DataTree) -> Result<Value> {
    let value = Interpreter::new()
        .evaluate(expression, tree)
        .with_context(|| format!("could not evaluate expression: {expression}"))?;
    Ok(match value {
        Some(value) => json!({ "value": value }),
        None => json!({ "undefined": true }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_tree(dir: &Path) -> PathBuf {
        let path = dir.join("tree.yaml");
        fs::write(
            &path,
            r#"
Table1:
  type: TABLE_WIDGET
  selectedRow: { id: 7 }
Select1:
  type: SELECT_WIDGET
  value: "{{Table1.selectedRow.id}}"
  dynamicBindings: { value: true }
"#,
        )
        .unwrap();
        path
    }

    #[test]
    fn evaluate_prints_the_pass_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = evaluate_command(&write_tree(dir.path()), false, None).unwrap();
        assert_eq!(output["status"], json!({"kind": "completed"}));
        assert_eq!(output["tree"]["Select1"]["value"], json!(7));
    }

    #[test]
    fn graph_lists_edges_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let tree = load_tree(&write_tree(dir.path())).unwrap();
        let output = graph_command(&tree).unwrap();
        assert_eq!(
            output["edges"],
            json!([{"dependent": "Select1.value", "dependency": "Table1.selectedRow.id"}])
        );
        assert_eq!(output["order"], json!(["Table1.selectedRow.id", "Select1.value"]));
    }

    #[test]
    fn bindings_and_eval_commands() {
        let bindings = run(Command::Bindings {
            text: "Hi {{User1.name}}".into(),
        })
        .unwrap();
        assert_eq!(bindings, json!({"bindings": ["Hi ", "{{User1.name}}"], "paths": ["", "User1.name"]}));

        assert_eq!(eval_command("1 + 2", &DataTree::new()).unwrap(), json!({"value": 3}));
        assert_eq!(eval_command("undefined", &DataTree::new()).unwrap(), json!({"undefined": true}));
        assert!(eval_command("Missing.value", &DataTree::new()).is_err());
    }
}
