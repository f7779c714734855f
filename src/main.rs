use clap::Parser;
use predicate_eval::{Context, EvalOptions, Evaluator, MissingKeyPolicy, Value};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Evaluate a predicate against a JSON dictionary.
///
/// Prints `true` or `false`. Exit status is 0 when the predicate holds,
/// 1 when it does not, 2 when it cannot be evaluated.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Predicate, e.g. `os_vers BEGINSWITH "14." AND arch == "arm64"`
    predicate: String,
    /// JSON file holding the context dictionary
    #[arg(short, long, env = "PEV_CONTEXT", conflicts_with = "json")]
    context: Option<PathBuf>,
    /// Context dictionary given inline as JSON
    #[arg(long)]
    json: Option<String>,
    /// Substitution variable as NAME=VALUE (repeatable). VALUE is read as
    /// JSON, falling back to a plain string.
    #[arg(long = "var", value_name = "NAME=VALUE")]
    vars: Vec<String>,
    /// Resolve missing keys to nil instead of failing
    #[arg(long, env = "PEV_LENIENT_KEYS")]
    lenient_keys: bool,
    /// Maximum nesting depth accepted by the parser
    #[arg(long, env = "PEV_MAX_DEPTH", default_value_t = 64)]
    max_depth: usize,
    /// Log filter (overrides RUST_LOG), e.g. `debug` or `predicate_eval=trace`
    #[arg(long, env = "PEV_LOG")]
    log_level: Option<String>,
}

fn main() {
    // Parse CLI arguments.
    let args = Args::parse();
    init_logging(args.log_level.as_deref());

    let status = match run(&args) {
        Ok(verdict) => {
            println!("{verdict}");
            exit_status(Ok(verdict))
        }
        Err(e) => {
            eprintln!("error: {e}");
            exit_status(Err(e))
        }
    };
    std::process::exit(status);
}

/// 0 when the predicate holds, 1 when it does not, 2 when it cannot be evaluated.
fn exit_status(outcome: Result<bool, String>) -> i32 {
    match outcome {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(_) => 2,
    }
}

fn run(args: &Args) -> Result<bool, String> {
    let mut ctx = load_context(args)?;
    for spec in &args.vars {
        let (name, value) = parse_var(spec)?;
        ctx.set_variable(name, value);
    }

    let options = EvalOptions {
        missing_keys: if args.lenient_keys {
            MissingKeyPolicy::Null
        } else {
            MissingKeyPolicy::Error
        },
        max_depth: args.max_depth,
    };
    Evaluator::default()
        .with_options(options)
        .evaluate(&args.predicate, &ctx)
        .map_err(|e| e.to_string())
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(l) => EnvFilter::new(l),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_context(args: &Args) -> Result<Context, String> {
    if let Some(path) = &args.context {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        return Context::from_json_str(&text).map_err(|e| e.to_string());
    }
    if let Some(json) = &args.json {
        return Context::from_json_str(json).map_err(|e| e.to_string());
    }
    Ok(Context::new())
}

fn parse_var(spec: &str) -> Result<(String, Value), String> {
    let (name, raw) = spec
        .split_once('=')
        .ok_or_else(|| format!("--var expects NAME=VALUE, got {spec:?}"))?;
    let value = serde_json::from_str::<serde_json::Value>(raw)
        .map(Value::from)
        .unwrap_or_else(|_| Value::from(raw));
    Ok((name.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn args(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("pev").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn var_values_are_json_or_plain_strings() {
        assert_eq!(parse_var("N=3").unwrap(), ("N".to_string(), Value::Integer(3)));
        assert_eq!(
            parse_var(r#"L=["a","b"]"#).unwrap(),
            ("L".to_string(), Value::from(vec!["a", "b"]))
        );
        assert_eq!(parse_var("S=arm64").unwrap(), ("S".to_string(), Value::from("arm64")));
        assert_eq!(parse_var("E=").unwrap(), ("E".to_string(), Value::from("")));
        assert!(parse_var("no-equals").unwrap_err().contains("NAME=VALUE"));
    }

    #[test]
    fn inline_context_must_be_an_object() {
        let inline = args(&["--json", r#"{"arch": "arm64"}"#, "TRUEPREDICATE"]);
        let ctx = load_context(&inline).unwrap();
        assert_eq!(ctx.get("arch"), Some(&Value::from("arm64")));
        assert!(load_context(&args(&["--json", "[1, 2]", "TRUEPREDICATE"])).is_err());
        assert!(load_context(&args(&["--json", "{", "TRUEPREDICATE"])).is_err());
    }

    #[test]
    fn context_file_and_inline_json_conflict() {
        let argv = ["pev", "--context", "ctx.json", "--json", "{}", "a == 1"];
        let parsed = Args::try_parse_from(argv);
        assert!(parsed.is_err());
    }

    #[test]
    fn verdicts_map_to_exit_status() {
        let json = r#"{"arch": "arm64"}"#;
        let holds = run(&args(&["--json", json, "arch == 'arm64'"]));
        assert_eq!(holds, Ok(true));
        assert_eq!(exit_status(holds), 0);

        let fails = run(&args(&["--json", json, "arch == 'x86_64'"]));
        assert_eq!(exit_status(fails), 1);

        let missing = run(&args(&["--json", json, "serial == 'C02X'"]));
        assert!(missing.is_err());
        assert_eq!(exit_status(missing), 2);
        assert_eq!(exit_status(run(&args(&["--json", json, "arch =="]))), 2);
    }

    #[test]
    fn lenient_keys_and_variables() {
        let json = r#"{"arch": "arm64"}"#;
        let lenient = args(&["--json", json, "--lenient-keys", "serial == nil"]);
        assert_eq!(run(&lenient), Ok(true));

        let with_var = args(&["--json", json, "--var", "WANT=arm64", "arch == $WANT"]);
        assert_eq!(run(&with_var), Ok(true));
        assert!(run(&args(&["--json", json, "--var", "oops", "arch == 'arm64'"])).is_err());
    }
}
