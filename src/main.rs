mod app;
mod config;
mod data;
mod processing;
mod state;
mod ui;
mod view;

use std::path::PathBuf;
use std::process::ExitCode;

use eframe::egui;
use tracing::error;

use app::LabelerApp;
use config::{ConfigStore, FileStore, ProjectStore, SessionError};

/// Resolve the session from the command line: a `.json` argument opens a
/// project, data-file arguments open a sidecar session, and no arguments
/// fall back to a folder picker.
fn build_store(args: &[String]) -> Result<Box<dyn ConfigStore>, SessionError> {
    if let [single] = args {
        let path = PathBuf::from(single);
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            return Ok(Box::new(ProjectStore::open(&path)?));
        }
    }

    let files: Vec<PathBuf> = if args.is_empty() {
        let Some(folder) = rfd::FileDialog::new()
            .set_title("Choose a folder of data files")
            .pick_folder()
        else {
            return Err(SessionError::NoUsableFiles);
        };
        config::discover_files(&folder)?
    } else {
        args.iter().map(PathBuf::from).collect()
    };

    Ok(Box::new(FileStore::open(files)?))
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let store = match build_store(&args) {
        Ok(store) => store,
        Err(err) => {
            error!(error = %err, "cannot start session");
            eprintln!("{err}");
            return ExitCode::from(err.exit_code() as u8);
        }
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("tslabel")
            .with_inner_size([1200.0, 800.0])
            .with_min_inner_size([700.0, 500.0]),
        ..Default::default()
    };

    let result = eframe::run_native(
        "tslabel",
        options,
        Box::new(move |cc| Ok(Box::new(LabelerApp::new(cc, store)))),
    );
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "ui loop failed");
            ExitCode::FAILURE
        }
    }
}
