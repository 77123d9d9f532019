use std::path::Path;
use std::sync::Arc;

use relume_restore_core::default_app_root;
use relume_restore_core::restore::batch::BatchCoordinator;
use relume_restore_core::restore::engine::{EngineLayout, ScriptRestoreEngine};
use relume_restore_core::restore::preflight::check_engine_setup;
use relume_restore_core::restore::report::inspect_output_tree;
use relume_restore_core::restore::runtime::{InvocationBudget, StdEngineCommandRunner};
use relume_restore_core::restore::service::RestoreService;
use relume_restore_core::restore::settings::{
    load_app_restore_settings, merge_restore_settings_overlays, resolve_restore_settings,
    RestoreSettings, RestoreSettingsOverlay,
};
use relume_restore_core::restore::EngineOptions;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let cli_args = std::env::args().skip(1).collect::<Vec<_>>();
    if matches!(cli_args.first().map(String::as_str), Some("run")) {
        run_batch_cli(cli_args.into_iter().skip(1).collect::<Vec<_>>())?;
        return Ok(());
    }
    if matches!(cli_args.first().map(String::as_str), Some("restore-one")) {
        run_restore_one_cli(cli_args.into_iter().skip(1).collect::<Vec<_>>())?;
        return Ok(());
    }
    if matches!(cli_args.first().map(String::as_str), Some("check-setup")) {
        run_check_setup_cli(cli_args.into_iter().skip(1).collect::<Vec<_>>())?;
        return Ok(());
    }
    if matches!(cli_args.first().map(String::as_str), Some("inspect-output")) {
        run_inspect_output_cli(cli_args.into_iter().skip(1).collect::<Vec<_>>())?;
        return Ok(());
    }

    match cli_args.first().map(String::as_str) {
        None | Some("-h") | Some("--help") => {
            print_root_usage();
            Ok(())
        }
        Some(unknown) => Err(std::io::Error::other(format!(
            "Unknown command: {unknown}\n\nUse --help for usage."
        ))
        .into()),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init();
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RunCliArgs {
    input_dir: String,
    output_dir: String,
    gpu: Option<i64>,
    with_scratch: bool,
    hr: bool,
    compare: bool,
    engine_root: Option<String>,
    python_binary: Option<String>,
    deadline_secs: Option<u64>,
    workers: Option<usize>,
    settings_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RestoreOneCliArgs {
    image: String,
    gpu: Option<i64>,
    with_scratch: bool,
    hr: bool,
    engine_root: Option<String>,
    python_binary: Option<String>,
    deadline_secs: Option<u64>,
    download_dir: Option<String>,
    settings_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct CheckSetupCliArgs {
    engine_root: Option<String>,
    python_binary: Option<String>,
    settings_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct InspectOutputCliArgs {
    output_dir: String,
}

fn engine_options_from(gpu: Option<i64>, with_scratch: bool, hr: bool) -> EngineOptions {
    EngineOptions {
        use_gpu: gpu.is_some_and(|device| device >= 0),
        remove_scratches: with_scratch,
        high_resolution: hr,
    }
}

fn resolve_settings_for_cli(
    overrides: RestoreSettingsOverlay,
    settings_path: Option<&str>,
) -> Result<RestoreSettings, Box<dyn std::error::Error>> {
    let app_root = default_app_root();
    let app_overlay = load_app_restore_settings(app_root.as_path(), settings_path)?;
    let merged = merge_restore_settings_overlays(&app_overlay, &overrides);
    Ok(resolve_restore_settings(app_root.as_path(), &merged))
}

fn build_service(settings: &RestoreSettings) -> RestoreService {
    let layout = EngineLayout::new(settings.engine_root.clone())
        .with_python_binary(settings.python_binary.clone());
    let mut budget = InvocationBudget::unlimited();
    if let Some(deadline) = settings.deadline {
        budget = budget.with_deadline(deadline);
    }
    let engine = ScriptRestoreEngine::new(layout, StdEngineCommandRunner)
        .with_budget(budget)
        .with_gpu_device(settings.gpu_device);
    let coordinator =
        BatchCoordinator::new(Arc::new(engine)).with_resolution_workers(settings.resolution_workers);
    RestoreService::new(coordinator).with_download_dir(settings.download_dir.clone())
}

fn run_batch_cli(args: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    if args
        .iter()
        .any(|arg| matches!(arg.as_str(), "-h" | "--help"))
    {
        print_run_usage();
        return Ok(());
    }
    let parsed = parse_run_cli_args(args.as_slice())?;
    let settings = resolve_settings_for_cli(
        RestoreSettingsOverlay {
            engine_root: parsed.engine_root.clone(),
            python_binary: parsed.python_binary.clone(),
            gpu_device: parsed.gpu.filter(|device| *device >= 0),
            deadline_secs: parsed.deadline_secs,
            resolution_workers: parsed.workers,
            download_dir: None,
        },
        parsed.settings_path.as_deref(),
    )?;
    let service = build_service(&settings);
    let options = engine_options_from(parsed.gpu, parsed.with_scratch, parsed.hr);

    let outcome = service.restore_dir(
        Path::new(parsed.input_dir.as_str()),
        Path::new(parsed.output_dir.as_str()),
        options,
        parsed.compare,
    )?;

    for item in &outcome.items {
        match item.restored.as_deref() {
            Some(restored) => {
                println!(
                    "restored  {} -> {}",
                    item.original.display(),
                    restored.display()
                );
            }
            None => {
                println!("missed    {}", item.original.display());
            }
        }
    }
    if !outcome.success {
        let status = outcome.engine_status_code.unwrap_or(-1);
        return Err(std::io::Error::other(format!(
            "engine invocation failed with status {status}: {}",
            outcome.engine_stderr.trim()
        ))
        .into());
    }
    println!("results under {}", outcome.output_dir.display());
    Ok(())
}

fn run_restore_one_cli(args: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    if args
        .iter()
        .any(|arg| matches!(arg.as_str(), "-h" | "--help"))
    {
        print_restore_one_usage();
        return Ok(());
    }
    let parsed = parse_restore_one_cli_args(args.as_slice())?;
    let settings = resolve_settings_for_cli(
        RestoreSettingsOverlay {
            engine_root: parsed.engine_root.clone(),
            python_binary: parsed.python_binary.clone(),
            gpu_device: parsed.gpu.filter(|device| *device >= 0),
            deadline_secs: parsed.deadline_secs,
            resolution_workers: None,
            download_dir: parsed.download_dir.clone(),
        },
        parsed.settings_path.as_deref(),
    )?;
    let service = build_service(&settings);
    let options = engine_options_from(parsed.gpu, parsed.with_scratch, parsed.hr);

    let outcome = service.restore_single(Path::new(parsed.image.as_str()), options)?;

    println!("original    {}", outcome.original.display());
    match outcome.restored.as_deref() {
        Some(restored) => println!("restored    {}", restored.display()),
        None => println!("restored    <none>"),
    }
    if let Some(comparison) = outcome.comparison.as_deref() {
        println!("comparison  {}", comparison.display());
    }
    if let Some(exported) = outcome.exported.as_deref() {
        println!("exported    {}", exported.display());
    }
    if outcome.restored.is_none() {
        return Err(std::io::Error::other("no restored output was produced").into());
    }
    Ok(())
}

fn run_check_setup_cli(args: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    if args
        .iter()
        .any(|arg| matches!(arg.as_str(), "-h" | "--help"))
    {
        print_check_setup_usage();
        return Ok(());
    }
    let parsed = parse_check_setup_cli_args(args.as_slice())?;
    let settings = resolve_settings_for_cli(
        RestoreSettingsOverlay {
            engine_root: parsed.engine_root.clone(),
            python_binary: parsed.python_binary.clone(),
            ..RestoreSettingsOverlay::default()
        },
        parsed.settings_path.as_deref(),
    )?;
    let layout = EngineLayout::new(settings.engine_root.clone())
        .with_python_binary(settings.python_binary.clone());

    let report = check_engine_setup(&layout);
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.ok {
        return Err(std::io::Error::other(format!(
            "engine setup incomplete; missing: {}",
            report.missing.join(", ")
        ))
        .into());
    }
    Ok(())
}

fn run_inspect_output_cli(args: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    if args
        .iter()
        .any(|arg| matches!(arg.as_str(), "-h" | "--help"))
    {
        print_inspect_output_usage();
        return Ok(());
    }
    let parsed = parse_inspect_output_cli_args(args.as_slice())?;
    let report = inspect_output_tree(Path::new(parsed.output_dir.as_str()));
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn parse_run_cli_args(args: &[String]) -> Result<RunCliArgs, Box<dyn std::error::Error>> {
    let mut input_dir = None::<String>;
    let mut output_dir = None::<String>;
    let mut gpu = None::<i64>;
    let mut with_scratch = false;
    let mut hr = false;
    let mut compare = false;
    let mut engine_root = None::<String>;
    let mut python_binary = None::<String>;
    let mut deadline_secs = None::<u64>;
    let mut workers = None::<usize>;
    let mut settings_path = None::<String>;

    let mut i = 0usize;
    while i < args.len() {
        let flag = args[i].as_str();
        let needs_value = |idx: usize| -> Result<String, Box<dyn std::error::Error>> {
            let Some(value) = args.get(idx + 1) else {
                return Err(std::io::Error::other(format!("Missing value for {flag}")).into());
            };
            Ok(value.clone())
        };

        match flag {
            "--input-dir" => {
                input_dir = Some(needs_value(i)?);
                i += 2;
            }
            "--output-dir" => {
                output_dir = Some(needs_value(i)?);
                i += 2;
            }
            "--gpu" => {
                gpu = Some(parse_integer_flag(needs_value(i)?.as_str(), "--gpu")?);
                i += 2;
            }
            "--with-scratch" => {
                with_scratch = true;
                i += 1;
            }
            "--hr" => {
                hr = true;
                i += 1;
            }
            "--compare" => {
                compare = true;
                i += 1;
            }
            "--engine-root" => {
                engine_root = Some(needs_value(i)?);
                i += 2;
            }
            "--python-binary" => {
                python_binary = Some(needs_value(i)?);
                i += 2;
            }
            "--deadline-secs" => {
                deadline_secs = Some(parse_integer_flag(
                    needs_value(i)?.as_str(),
                    "--deadline-secs",
                )?);
                i += 2;
            }
            "--workers" => {
                workers = Some(parse_integer_flag(needs_value(i)?.as_str(), "--workers")?);
                i += 2;
            }
            "--settings" => {
                settings_path = Some(needs_value(i)?);
                i += 2;
            }
            unknown => {
                return Err(std::io::Error::other(format!(
                    "Unknown argument: {unknown}\n\nUse --help for usage."
                ))
                .into());
            }
        }
    }

    let input_dir = input_dir
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| std::io::Error::other("Missing required --input-dir"))?;
    let output_dir = output_dir
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| std::io::Error::other("Missing required --output-dir"))?;
    Ok(RunCliArgs {
        input_dir,
        output_dir,
        gpu,
        with_scratch,
        hr,
        compare,
        engine_root,
        python_binary,
        deadline_secs,
        workers,
        settings_path,
    })
}

fn parse_restore_one_cli_args(
    args: &[String],
) -> Result<RestoreOneCliArgs, Box<dyn std::error::Error>> {
    let mut image = None::<String>;
    let mut gpu = None::<i64>;
    let mut with_scratch = false;
    let mut hr = false;
    let mut engine_root = None::<String>;
    let mut python_binary = None::<String>;
    let mut deadline_secs = None::<u64>;
    let mut download_dir = None::<String>;
    let mut settings_path = None::<String>;

    let mut i = 0usize;
    while i < args.len() {
        let flag = args[i].as_str();
        let needs_value = |idx: usize| -> Result<String, Box<dyn std::error::Error>> {
            let Some(value) = args.get(idx + 1) else {
                return Err(std::io::Error::other(format!("Missing value for {flag}")).into());
            };
            Ok(value.clone())
        };

        match flag {
            "--image" => {
                image = Some(needs_value(i)?);
                i += 2;
            }
            "--gpu" => {
                gpu = Some(parse_integer_flag(needs_value(i)?.as_str(), "--gpu")?);
                i += 2;
            }
            "--with-scratch" => {
                with_scratch = true;
                i += 1;
            }
            "--hr" => {
                hr = true;
                i += 1;
            }
            "--engine-root" => {
                engine_root = Some(needs_value(i)?);
                i += 2;
            }
            "--python-binary" => {
                python_binary = Some(needs_value(i)?);
                i += 2;
            }
            "--deadline-secs" => {
                deadline_secs = Some(parse_integer_flag(
                    needs_value(i)?.as_str(),
                    "--deadline-secs",
                )?);
                i += 2;
            }
            "--download-dir" => {
                download_dir = Some(needs_value(i)?);
                i += 2;
            }
            "--settings" => {
                settings_path = Some(needs_value(i)?);
                i += 2;
            }
            unknown => {
                return Err(std::io::Error::other(format!(
                    "Unknown argument: {unknown}\n\nUse --help for usage."
                ))
                .into());
            }
        }
    }

    let image = image
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| std::io::Error::other("Missing required --image"))?;
    Ok(RestoreOneCliArgs {
        image,
        gpu,
        with_scratch,
        hr,
        engine_root,
        python_binary,
        deadline_secs,
        download_dir,
        settings_path,
    })
}

fn parse_check_setup_cli_args(
    args: &[String],
) -> Result<CheckSetupCliArgs, Box<dyn std::error::Error>> {
    let mut parsed = CheckSetupCliArgs::default();

    let mut i = 0usize;
    while i < args.len() {
        let flag = args[i].as_str();
        let needs_value = |idx: usize| -> Result<String, Box<dyn std::error::Error>> {
            let Some(value) = args.get(idx + 1) else {
                return Err(std::io::Error::other(format!("Missing value for {flag}")).into());
            };
            Ok(value.clone())
        };

        match flag {
            "--engine-root" => {
                parsed.engine_root = Some(needs_value(i)?);
                i += 2;
            }
            "--python-binary" => {
                parsed.python_binary = Some(needs_value(i)?);
                i += 2;
            }
            "--settings" => {
                parsed.settings_path = Some(needs_value(i)?);
                i += 2;
            }
            unknown => {
                return Err(std::io::Error::other(format!(
                    "Unknown argument: {unknown}\n\nUse --help for usage."
                ))
                .into());
            }
        }
    }

    Ok(parsed)
}

fn parse_inspect_output_cli_args(
    args: &[String],
) -> Result<InspectOutputCliArgs, Box<dyn std::error::Error>> {
    let mut output_dir = None::<String>;

    let mut i = 0usize;
    while i < args.len() {
        let flag = args[i].as_str();
        let needs_value = |idx: usize| -> Result<String, Box<dyn std::error::Error>> {
            let Some(value) = args.get(idx + 1) else {
                return Err(std::io::Error::other(format!("Missing value for {flag}")).into());
            };
            Ok(value.clone())
        };

        match flag {
            "--output-dir" => {
                output_dir = Some(needs_value(i)?);
                i += 2;
            }
            unknown => {
                return Err(std::io::Error::other(format!(
                    "Unknown argument: {unknown}\n\nUse --help for usage."
                ))
                .into());
            }
        }
    }

    let output_dir = output_dir
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| std::io::Error::other("Missing required --output-dir"))?;
    Ok(InspectOutputCliArgs { output_dir })
}

fn parse_integer_flag<T: std::str::FromStr>(
    value: &str,
    flag: &str,
) -> Result<T, Box<dyn std::error::Error>> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| std::io::Error::other(format!("Invalid value for {flag}: {value}")).into())
}

fn print_root_usage() {
    eprintln!(concat!(
        "Usage:\n",
        "  cargo run -- run            batch-restore every image in a directory\n",
        "  cargo run -- restore-one    restore a single image and export a copy\n",
        "  cargo run -- check-setup    verify the engine installation\n",
        "  cargo run -- inspect-output survey an engine output tree\n\n",
        "Run any command with --help for its flags.\n"
    ));
}

fn print_run_usage() {
    eprintln!(concat!(
        "Usage:\n",
        "  cargo run -- run --input-dir PATH --output-dir PATH ",
        "[--gpu ID] [--with-scratch] [--hr] [--compare] ",
        "[--engine-root PATH] [--python-binary NAME] ",
        "[--deadline-secs N] [--workers N] [--settings PATH]\n\n",
        "Defaults:\n",
        "  --gpu omitted runs on CPU; --gpu -1 also selects CPU\n",
        "  engine root defaults to <app root>/photo_restoration\n",
        "  settings default: config/restore.settings.toml ",
        "(fallback: config/restore.settings.json)\n"
    ));
}

fn print_restore_one_usage() {
    eprintln!(concat!(
        "Usage:\n",
        "  cargo run -- restore-one --image PATH ",
        "[--gpu ID] [--with-scratch] [--hr] ",
        "[--engine-root PATH] [--python-binary NAME] ",
        "[--deadline-secs N] [--download-dir PATH] [--settings PATH]\n"
    ));
}

fn print_check_setup_usage() {
    eprintln!(concat!(
        "Usage:\n",
        "  cargo run -- check-setup [--engine-root PATH] ",
        "[--python-binary NAME] [--settings PATH]\n"
    ));
}

fn print_inspect_output_usage() {
    eprintln!(concat!(
        "Usage:\n",
        "  cargo run -- inspect-output --output-dir PATH\n"
    ));
}
