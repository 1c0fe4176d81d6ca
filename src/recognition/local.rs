use super::{page_blocks, EngineKind, TextRecognizer};
use crate::error::RecognitionError;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(25);
// Sparse text: overlays are short lines scattered over the frame.
const PAGE_SEGMENTATION_MODE: &str = "11";

/// Local OCR through the `tesseract` command-line program.
///
/// The engine is probed once, on first use: the binary must run and have
/// every requested language installed. If the probe fails the engine stays
/// unavailable for the life of the process and is never probed again.
pub struct TesseractEngine {
    binary: PathBuf,
    languages: Vec<String>,
    timeout: Duration,
    ready: OnceLock<Result<String, String>>,
}

impl TesseractEngine {
    pub fn new(binary: impl Into<PathBuf>, languages: Vec<String>, timeout: Duration) -> Self {
        TesseractEngine {
            binary: binary.into(),
            languages,
            timeout,
            ready: OnceLock::new(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.initialize().is_ok()
    }

    fn initialize(&self) -> Result<&str, RecognitionError> {
        let state = self.ready.get_or_init(|| match self.probe() {
            Ok(version) => {
                info!("Tesseract initialized successfully: {}", version);
                Ok(version)
            }
            Err(reason) => {
                warn!("Could not initialize Tesseract: {}. It will not be available.", reason);
                Err(reason)
            }
        });
        state
            .as_deref()
            .map_err(|reason| RecognitionError::Init(reason.clone()))
    }

    fn probe(&self) -> Result<String, String> {
        let mut command = Command::new(&self.binary);
        command.arg("--version");
        let output = run_with_timeout(command, None, self.timeout).map_err(|e| e.to_string())?;
        if !output.status.success() {
            return Err(format!("{} --version exited with {}", self.binary.display(), output.status));
        }
        // Older releases print the banner on stderr.
        let banner = if output.stdout.is_empty() { &output.stderr } else { &output.stdout };
        let version = String::from_utf8_lossy(banner)
            .lines()
            .next()
            .unwrap_or("tesseract")
            .trim()
            .to_string();

        let mut command = Command::new(&self.binary);
        command.arg("--list-langs");
        let output = run_with_timeout(command, None, self.timeout).map_err(|e| e.to_string())?;
        let listing = String::from_utf8_lossy(&output.stdout);
        let installed: Vec<&str> = listing.lines().skip(1).map(str::trim).collect();
        let missing: Vec<&str> = self
            .languages
            .iter()
            .map(String::as_str)
            .filter(|lang| !installed.contains(lang))
            .collect();
        if !missing.is_empty() {
            return Err(format!("missing language data: {}", missing.join(", ")));
        }

        Ok(version)
    }
}

impl TextRecognizer for TesseractEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Local
    }

    fn name(&self) -> &str {
        "Tesseract"
    }

    fn recognize(&self, image: &[u8]) -> Result<Vec<String>, RecognitionError> {
        self.initialize()?;

        let mut command = Command::new(&self.binary);
        command
            .arg("stdin")
            .arg("stdout")
            .arg("-l")
            .arg(self.languages.join("+"))
            .arg("--psm")
            .arg(PAGE_SEGMENTATION_MODE);

        let output = run_with_timeout(command, Some(image), self.timeout)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RecognitionError::Process(stderr.trim().to_string()));
        }

        Ok(page_blocks(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Runs a child process to completion, feeding `input` on stdin. The child
/// is killed once `timeout` elapses.
fn run_with_timeout(
    mut command: Command,
    input: Option<&[u8]>,
    timeout: Duration,
) -> Result<Output, RecognitionError> {
    command
        .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .map_err(|e| RecognitionError::Process(format!("failed to start: {}", e)))?;

    let writer = match (input, child.stdin.take()) {
        (Some(bytes), Some(mut stdin)) => {
            let bytes = bytes.to_vec();
            // Dropping stdin at the end of the thread signals EOF.
            Some(thread::spawn(move || stdin.write_all(&bytes)))
        }
        _ => None,
    };
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(RecognitionError::Timeout(timeout));
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => return Err(RecognitionError::Process(e.to_string())),
        }
    };

    // A child that exits without reading all of stdin is not an error here.
    if let Some(writer) = writer {
        let _ = writer.join();
    }
    let collect = |handle: Option<thread::JoinHandle<Vec<u8>>>| {
        handle.and_then(|h| h.join().ok()).unwrap_or_default()
    };

    Ok(Output {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
    })
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}
