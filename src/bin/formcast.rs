//! formcast CLI
//!
//! Command-line front end for filling in and sending catalog operations.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use formcast::{
    decode_data_url, prepare, BinaryUpload, Catalog, CatalogError, DispatchResult, FieldSchema,
    FlatSubmission, Operation, PreparedRequest, ResponseStatus, Session,
};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "formcast")]
#[command(about = "Fill in and send API operation forms from a catalog")]
#[command(version)]
struct Cli {
    /// Catalog file (default: the built-in catalog)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Log pipeline steps to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every operation in the catalog
    List {
        /// Print the catalog document as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the form of one operation
    Describe {
        /// Operation name or 1-based index
        operation: String,
    },

    /// Validate the catalog
    Check,

    /// Fill in an operation's form and send it
    Submit {
        /// Operation name or 1-based index (default: route from $method/$endpoint fields)
        operation: Option<String>,

        /// Text field value, keyed by dot path (repeatable)
        #[arg(long = "field", short = 'f', value_name = "KEY=VALUE")]
        fields: Vec<String>,

        /// File field, keyed by dot path, with optional ";type=<media type>" (repeatable)
        #[arg(long = "file", value_name = "KEY=PATH")]
        files: Vec<String>,

        /// Server the endpoint paths are resolved against
        #[arg(
            long,
            env = "FORMCAST_BASE_URL",
            default_value = "http://localhost:3000"
        )]
        base_url: String,

        /// JSON file holding session cookies, read before and written after the request
        #[arg(long)]
        session: Option<PathBuf>,

        /// Request timeout in seconds (default: none)
        #[arg(long)]
        timeout: Option<u64>,

        /// Print the prepared request instead of sending it
        #[arg(long)]
        dry_run: bool,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::List { json } => run_list(cli.catalog.as_deref(), json),
        Commands::Describe { operation } => run_describe(cli.catalog.as_deref(), &operation),
        Commands::Check => run_check(cli.catalog.as_deref()),
        Commands::Submit {
            operation,
            fields,
            files,
            base_url,
            session,
            timeout,
            dry_run,
            pretty,
        } => run_submit(SubmitArgs {
            catalog: cli.catalog,
            operation,
            fields,
            files,
            base_url,
            session,
            timeout: timeout.map(Duration::from_secs),
            dry_run,
            pretty,
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "formcast=debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_catalog(path: Option<&Path>) -> Result<Catalog, u8> {
    let result = match path {
        Some(path) => Catalog::load(path),
        None => Catalog::builtin(),
    };
    result.map_err(|e| {
        report_catalog_error(&e);
        e.exit_code() as u8
    })
}

fn report_catalog_error(e: &CatalogError) {
    eprintln!("Error: {}", e);
    if let CatalogError::Invalid { issues } = e {
        for issue in issues {
            eprintln!("  {}", issue);
        }
    }
}

fn select<'a>(catalog: &'a Catalog, query: &str) -> Result<&'a Operation, u8> {
    catalog.select(query).map_err(|e| {
        report_catalog_error(&e);
        e.exit_code() as u8
    })
}

fn to_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<String, u8> {
    if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })
}

fn run_list(catalog: Option<&Path>, json: bool) -> Result<(), u8> {
    let catalog = load_catalog(catalog)?;

    if json {
        println!("{}", to_json(&catalog.to_value(), true)?);
        return Ok(());
    }

    for (index, op) in catalog.iter().enumerate() {
        println!(
            "{:>3}. {:<6} {:<36} {}",
            index + 1,
            op.method.as_str(),
            op.endpoint,
            op.name
        );
    }
    Ok(())
}

fn run_describe(catalog: Option<&Path>, query: &str) -> Result<(), u8> {
    let catalog = load_catalog(catalog)?;
    let op = select(&catalog, query)?;

    println!("{}", op.name);
    println!("  {} {}", op.method, op.endpoint);
    let placeholders = op.placeholders();
    if !placeholders.is_empty() {
        println!("  path parameters: {}", placeholders.join(", "));
    }
    if op.rich_response {
        println!("  response: post preview");
    }
    println!();

    if op.fields.leaves().is_empty() {
        println!("  (no fields)");
    } else {
        print_fields(&op.fields, 1, "");
    }
    Ok(())
}

/// Print a form tree, one line per field, children indented under their node.
fn print_fields(schema: &FieldSchema, indent: usize, prefix: &str) {
    let FieldSchema::Node(children) = schema else {
        return;
    };
    for field in children {
        let key = if prefix.is_empty() {
            field.name.clone()
        } else {
            format!("{}.{}", prefix, field.name)
        };
        let pad = "  ".repeat(indent);
        match &field.schema {
            FieldSchema::Leaf(kind) => println!("{}{}: <{}>  [{}]", pad, field.name, kind.tag(), key),
            node @ FieldSchema::Node(_) => {
                println!("{}{}:", pad, field.name);
                print_fields(node, indent + 1, &key);
            }
        }
    }
}

fn run_check(catalog: Option<&Path>) -> Result<(), u8> {
    let catalog = load_catalog(catalog)?;
    let fields: usize = catalog.iter().map(|op| op.fields.leaves().len()).sum();
    println!(
        "Catalog OK: {} operations, {} fields",
        catalog.len(),
        fields
    );
    Ok(())
}

struct SubmitArgs {
    catalog: Option<PathBuf>,
    operation: Option<String>,
    fields: Vec<String>,
    files: Vec<String>,
    base_url: String,
    session: Option<PathBuf>,
    timeout: Option<Duration>,
    dry_run: bool,
    pretty: bool,
}

fn run_submit(args: SubmitArgs) -> Result<(), u8> {
    let catalog = load_catalog(args.catalog.as_deref())?;
    let mut submission = build_submission(&args.fields, &args.files)?;

    let op = match &args.operation {
        Some(query) => select(&catalog, query)?,
        None => catalog.route_form(&mut submission).map_err(|e| {
            eprintln!("Error: {}", e);
            e.exit_code() as u8
        })?,
    };

    let request = match prepare(op, submission) {
        Ok(request) => request,
        Err(e) => {
            print_result(&DispatchResult::failed(&e), args.pretty)?;
            return Err(e.exit_code() as u8);
        }
    };

    if args.dry_run {
        return print_request(&request, &args.base_url, args.pretty);
    }

    let mut session = match &args.session {
        Some(path) => load_session(path)?,
        None => Session::anonymous(),
    };

    let result = send(&request, &mut session, &args)?;

    if let Some(path) = &args.session {
        save_session(path, &session)?;
    }

    print_result(&result, args.pretty)?;
    if op.rich_response && result.status != ResponseStatus::Unavailable {
        print_post_preview(&result.body);
    }

    match result.status {
        ResponseStatus::Unavailable => Err(3),
        ResponseStatus::Code(_) if result.is_success() => Ok(()),
        ResponseStatus::Code(_) => Err(1),
    }
}

#[cfg(feature = "remote")]
fn send(
    request: &PreparedRequest,
    session: &mut Session,
    args: &SubmitArgs,
) -> Result<DispatchResult, u8> {
    use formcast::{ClientOptions, Dispatcher, HttpTransport};

    let mut options = ClientOptions::new(&args.base_url);
    if let Some(timeout) = args.timeout {
        options = options.timeout(timeout);
    }
    let transport = HttpTransport::new(&options).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    Ok(Dispatcher::new(transport).dispatch(request, session))
}

#[cfg(not(feature = "remote"))]
fn send(
    _request: &PreparedRequest,
    _session: &mut Session,
    _args: &SubmitArgs,
) -> Result<DispatchResult, u8> {
    eprintln!("Error: built without the `remote` feature; use --dry-run");
    Err(3)
}

/// Collect `--field` and `--file` arguments into a flat submission.
fn build_submission(fields: &[String], files: &[String]) -> Result<FlatSubmission, u8> {
    let mut submission = FlatSubmission::new();

    for field in fields {
        let (key, value) = split_assignment(field, "--field")?;
        submission.insert(key, value);
    }

    for file in files {
        let (key, location) = split_assignment(file, "--file")?;
        let upload = match location.split_once(";type=") {
            Some((path, media_type)) => BinaryUpload::from_path(path).media_type(media_type),
            None => BinaryUpload::from_path(location),
        };
        submission.insert(key, upload);
    }

    Ok(submission)
}

fn split_assignment<'a>(arg: &'a str, flag: &str) -> Result<(&'a str, &'a str), u8> {
    match arg.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => {
            eprintln!("Error: {} expects KEY=VALUE, got \"{}\"", flag, arg);
            Err(2)
        }
    }
}

fn load_session(path: &Path) -> Result<Session, u8> {
    if !path.exists() {
        return Ok(Session::anonymous());
    }
    let content = std::fs::read_to_string(path).map_err(|e| {
        eprintln!("Error reading session {}: {}", path.display(), e);
        3u8
    })?;
    serde_json::from_str(&content).map_err(|e| {
        eprintln!("Error: session file {} is not valid: {}", path.display(), e);
        2u8
    })
}

fn save_session(path: &Path, session: &Session) -> Result<(), u8> {
    let content = to_json(session, true)?;
    std::fs::write(path, content).map_err(|e| {
        eprintln!("Error writing session {}: {}", path.display(), e);
        3u8
    })
}

fn print_request(request: &PreparedRequest, base_url: &str, pretty: bool) -> Result<(), u8> {
    println!(
        "{} {}{}",
        request.method,
        base_url.trim_end_matches('/'),
        request.target()
    );
    if let Some(body) = &request.body {
        println!("{}", to_json(body, pretty)?);
    }
    Ok(())
}

fn print_result(result: &DispatchResult, pretty: bool) -> Result<(), u8> {
    println!("Status: {}", result.status);
    println!("{}", to_json(&result.body, pretty)?);
    Ok(())
}

/// Preview the first post of a response: its content and decoded photo.
fn print_post_preview(body: &Value) {
    println!();
    let Some(post) = body.as_array().and_then(|posts| posts.first()) else {
        println!("No post available.");
        return;
    };

    let content = post
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or("No content available");
    println!("Content: {}", content);

    match post
        .get("photo")
        .and_then(Value::as_str)
        .filter(|photo| !photo.is_empty())
    {
        Some(photo) => match decode_data_url(photo) {
            Some(decoded) => println!(
                "Photo: {} ({} bytes)",
                decoded.media_type,
                decoded.bytes.len()
            ),
            None => println!("Photo: not a readable image"),
        },
        None => println!("No photo available."),
    }
}
