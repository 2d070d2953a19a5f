use std::path::PathBuf;

use clap::Parser;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use shardrustql::{RuleConfiguration, ShardingError, ShardingKernel, Value};
use tracing_subscriber::EnvFilter;

/// Environment variable naming the rule configuration file.
const CONFIG_ENV: &str = "SHARDRUSTQL_CONFIG";

const HISTORY_FILE: &str = ".shardrustql_history";

const CONFIG_PATHS: [&str; 2] = ["./shardrustql.toml", "/etc/shardrustql/shardrustql.toml"];

/// ShardrustQL route preview
#[derive(Parser, Debug)]
#[command(name = "shardrustql")]
#[command(about = "Shows how SQL is routed and rewritten across shards", long_about = None)]
struct Args {
    /// Rule configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Statement parameter, repeatable, bound to `?` markers in order
    #[arg(short = 'p', long = "param")]
    params: Vec<String>,

    /// Log routing decisions
    #[arg(short, long)]
    verbose: bool,

    /// SQL to preview; starts an interactive prompt when omitted
    sql: Option<String>,
}

/// Config file with priority: CLI arg > ENV > ./ > /etc
fn find_config(args: &Args) -> Option<PathBuf> {
    if let Some(path) = &args.config {
        return Some(path.clone());
    }
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    CONFIG_PATHS.iter().map(PathBuf::from).find(|p| p.exists())
}

/// `NULL`, booleans and integers are typed; anything else is text.
fn parse_param(raw: &str) -> Value {
    match raw {
        "NULL" | "null" => Value::Null,
        "true" | "TRUE" => Value::Boolean(true),
        "false" | "FALSE" => Value::Boolean(false),
        _ => raw
            .parse::<i64>()
            .map_or_else(|_| Value::Text(raw.trim_matches('\'').to_string()), Value::Integer),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "shardrustql=debug" } else { "warn,shardrustql::sql=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn preview(kernel: &ShardingKernel, sql: &str, parameters: &[Value]) -> Result<(), ShardingError> {
    let context = kernel.parse_and_prepare(sql, parameters)?;
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["#", "Data source", "Tables", "Actual SQL", "Parameters"]);
    for (unit, route) in context.units.iter().zip(&context.route_context.units) {
        let tables: Vec<String> = route
            .table_mappers
            .iter()
            .map(|m| format!("{} -> {}", m.logic_name, m.actual_name))
            .collect();
        let parameters: Vec<String> = unit.parameters.iter().map(Value::to_sql_literal).collect();
        table.add_row(vec![
            unit.index.to_string(),
            unit.data_source.clone(),
            tables.join("\n"),
            unit.sql.clone(),
            parameters.join(", "),
        ]);
    }
    println!("{table}");
    if let Some(key) = context.generated_key().filter(|k| k.generated) {
        let values: Vec<String> = key.values.iter().map(ToString::to_string).collect();
        println!("Generated {}: {}", key.column, values.join(", "));
    }
    Ok(())
}

fn print_rules(kernel: &ShardingKernel) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["Logic table", "Data nodes", "Binding group"]);
    let sharding = &kernel.rules().sharding;
    for rule in sharding.table_rules() {
        let nodes: Vec<String> = rule.actual_data_nodes.iter().map(ToString::to_string).collect();
        let binding = sharding
            .binding_group_of(&rule.logic_table)
            .map(|g| g.join(", "))
            .unwrap_or_default();
        table.add_row(vec![rule.logic_table.clone(), nodes.join(", "), binding]);
    }
    for broadcast in sharding.broadcast_tables() {
        table.add_row(vec![broadcast.clone(), "(broadcast)".to_string(), String::new()]);
    }
    println!("{table}");
}

fn history_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(HISTORY_FILE))
}

fn repl(kernel: &ShardingKernel, mut parameters: Vec<Value>) -> Result<(), Box<dyn std::error::Error>> {
    let mut rl = DefaultEditor::new()?;
    let history = history_path();
    if let Some(path) = &history {
        let _ = rl.load_history(path);
    }
    println!("Type SQL to preview its route, \\? for help, \\q to quit.\n");

    loop {
        match rl.readline("shardrustql> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);
                match line {
                    "\\q" | "\\quit" | "quit" | "exit" => break,
                    "\\?" | "\\help" => {
                        println!("Meta-commands:");
                        println!("  \\params [v ...]   - Set parameters for following statements (none clears)");
                        println!("  \\rules            - Show sharding tables");
                        println!("  \\q, \\quit         - Quit");
                    }
                    "\\rules" => print_rules(kernel),
                    _ if line.starts_with("\\params") => {
                        parameters = line.split_whitespace().skip(1).map(parse_param).collect();
                        println!("{} parameter(s) set", parameters.len());
                    }
                    _ if line.starts_with('\\') => println!("Unknown meta-command: {line}. Use \\? for help."),
                    sql => {
                        if let Err(e) = preview(kernel, sql, &parameters) {
                            eprintln!("Error: {e}");
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Error: {e}");
                break;
            }
        }
    }

    if let Some(path) = &history {
        let _ = rl.save_history(path);
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let Some(path) = find_config(&args) else {
        eprintln!("No rule configuration found.");
        eprintln!("Pass --config, set {CONFIG_ENV}, or create one of: {}", CONFIG_PATHS.join(", "));
        std::process::exit(2);
    };
    tracing::info!(path = %path.display(), "loading rule configuration");
    let kernel = ShardingKernel::from_config(&RuleConfiguration::load(&path)?)?;
    let parameters: Vec<Value> = args.params.iter().map(String::as_str).map(parse_param).collect();

    match &args.sql {
        Some(sql) => preview(&kernel, sql, &parameters)?,
        None => repl(&kernel, parameters)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_lives_in_home_dir() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(history_path(), Some(home.join(".shardrustql_history")));
        } else {
            assert_eq!(history_path(), None);
        }
    }

    #[test]
    fn test_parse_param_kinds() {
        assert_eq!(parse_param("42"), Value::Integer(42));
        assert_eq!(parse_param("NULL"), Value::Null);
    }
}
