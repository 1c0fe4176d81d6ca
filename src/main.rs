use anyhow::{bail, Context, Result};
use geophoto::constants::{LOG_FILE_NAME, PREPROCESS_DEBUG_DIR};
use geophoto::logging::init_logging;
use geophoto::preprocess::{ImagePreprocessor, PreprocessMethod};
use geophoto::processing;
use geophoto::recognition::{EngineKind, TesseractEngine, VisionEngine};
use geophoto::records::{write_output, OutputFormat};
use geophoto::settings::Settings;
use geophoto::{RecognitionBudget, Resolver, ResolverPolicy};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

const HELP: &str = "\
geophoto - find where photos were taken

USAGE:
  geophoto [-v] gps-extract -i DIR -o FILE [OPTIONS]

OPTIONS:
  -i, --input-dir DIR          Folder with .jpg/.jpeg/.png photos
  -o, --output-file FILE       Output file (.json report or .jsonl records)
  --config FILE                Task config merged over global_config.toml
  --ocr-disabled               EXIF only, never run text recognition
  --ocr-engine ENGINE          Primary engine: tesseract | vision
  --gcv-fallback               Retry with Google Vision when tesseract finds nothing
  --gcv-limit N                Max Google Vision calls per run (-1 = no limit)
  --no-ocr-on-invalid-gps      Skip recognition when EXIF GPS exists but is invalid
  --preprocess METHOD          auto | gray | brighten | denoise | threshold | off
  --save-preprocessed          Keep preprocessed images in <DIR>/_preprocessed_debug
  --no-full-path               Leave the absolute photo path out of the output
  --recursive                  Include subfolders
  --jobs N                     Photos processed in parallel (default 1)
  -v, --verbose                Debug logging
  -h, --help                   Print this help
";

#[derive(Debug)]
struct GpsExtractArgs {
    input_dir: PathBuf,
    output_file: PathBuf,
    config: Option<PathBuf>,
    ocr_disabled: bool,
    ocr_engine: Option<EngineKind>,
    gcv_fallback: bool,
    gcv_limit: Option<i64>,
    no_ocr_on_invalid_gps: bool,
    preprocess: Option<PreprocessMethod>,
    save_preprocessed: bool,
    full_path: bool,
    recursive: bool,
    jobs: Option<usize>,
}

impl GpsExtractArgs {
    fn parse(args: &mut pico_args::Arguments) -> Result<Self> {
        Ok(GpsExtractArgs {
            input_dir: args.value_from_str(["-i", "--input-dir"])?,
            output_file: args.value_from_str(["-o", "--output-file"])?,
            config: args.opt_value_from_str("--config")?,
            ocr_disabled: args.contains("--ocr-disabled"),
            ocr_engine: args.opt_value_from_str("--ocr-engine")?,
            gcv_fallback: args.contains("--gcv-fallback"),
            gcv_limit: args.opt_value_from_str("--gcv-limit")?,
            no_ocr_on_invalid_gps: args.contains("--no-ocr-on-invalid-gps"),
            preprocess: args.opt_value_from_str("--preprocess")?,
            save_preprocessed: args.contains("--save-preprocessed"),
            full_path: !args.contains("--no-full-path"),
            recursive: args.contains("--recursive"),
            jobs: args.opt_value_from_str("--jobs")?,
        })
    }
}

fn main() -> Result<()> {
    let mut args = pico_args::Arguments::from_env();

    if args.contains(["-h", "--help"]) {
        print!("{}", HELP);
        return Ok(());
    }
    let verbose = args.contains(["-v", "--verbose"]);

    match args.subcommand()?.as_deref() {
        Some("gps-extract") => {
            let opts = GpsExtractArgs::parse(&mut args)?;
            let rest = args.finish();
            if !rest.is_empty() {
                bail!("Unexpected arguments: {:?}", rest);
            }
            gps_extract(opts, verbose)
        }
        Some(other) => bail!("Unknown command '{}'. Run with --help for usage.", other),
        None => {
            print!("{}", HELP);
            Ok(())
        }
    }
}

fn output_folder(output_file: &Path) -> PathBuf {
    match output_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn gps_extract(opts: GpsExtractArgs, verbose: bool) -> Result<()> {
    // Fail before any photo is touched.
    OutputFormat::from_path(&opts.output_file)?;

    let folder = output_folder(&opts.output_file);
    std::fs::create_dir_all(&folder)
        .with_context(|| format!("Failed to create output folder {}", folder.display()))?;
    init_logging(verbose, Some(&folder.join(LOG_FILE_NAME)))?;

    info!("--- Starting GPS Extraction Workflow ---");
    let settings = Settings::load(opts.config.as_deref()).context("Failed to load configuration")?;
    let ocr = &settings.ocr;

    let policy = ResolverPolicy {
        ocr_disabled: opts.ocr_disabled || ocr.disabled,
        skip_ocr_on_invalid: opts.no_ocr_on_invalid_gps || ocr.skip_on_invalid_gps,
        remote_fallback: opts.gcv_fallback || ocr.fallback,
        primary: opts.ocr_engine.unwrap_or(ocr.engine),
    };
    let vision_limit = match opts.gcv_limit {
        Some(limit) => usize::try_from(limit).ok(),
        None => ocr.vision_limit(),
    };
    let jobs = opts.jobs.unwrap_or(ocr.jobs).max(1);

    if policy.ocr_disabled {
        info!("Mode: EXIF-only. OCR fallback is completely disabled.");
    } else {
        info!("Primary OCR engine: {}", policy.primary);
        if policy.primary == EngineKind::Local && policy.remote_fallback {
            match vision_limit {
                Some(limit) => info!("Google Vision fallback is ENABLED for up to {} images.", limit),
                None => info!("Google Vision fallback is ENABLED for all failed images."),
            }
        }
        if policy.skip_ocr_on_invalid {
            info!("Strict mode: OCR will be skipped for images with invalid EXIF GPS.");
        }
    }

    let budget = Arc::new(RecognitionBudget::new(vision_limit));
    let mut resolver = Resolver::new(settings.extract.columns.clone(), policy, Arc::clone(&budget));

    if !policy.ocr_disabled {
        let timeout = ocr.timeout();
        let local = TesseractEngine::new(ocr.tesseract_path.clone(), ocr.languages.clone(), timeout);
        let remote = VisionEngine::new(settings.google_cloud.service_account_key_path.clone(), timeout);

        let mut preprocessor = ImagePreprocessor::new(opts.preprocess.unwrap_or(ocr.preprocess));
        if opts.save_preprocessed {
            preprocessor = preprocessor.with_debug_dir(opts.input_dir.join(PREPROCESS_DEBUG_DIR));
        }

        resolver = resolver
            .with_local(Arc::new(local))
            .with_remote(Arc::new(remote))
            .with_preprocessor(Arc::new(preprocessor));
    }

    let summary = processing::run(&resolver, &opts.input_dir, opts.recursive, jobs)?;
    if summary.records.is_empty() {
        warn!("No images processed. No output file will be created.");
        return Ok(());
    }

    write_output(
        &opts.output_file,
        &opts.input_dir,
        &summary.records,
        &summary.stats,
        opts.full_path,
    )?;

    info!("--- GPS Extraction Workflow Completed ---");
    Ok(())
}
