//
// main.rs
// Dicom-Harmonize
//
// Binary entry point that hands off execution to the CLI layer.
//
// Thales Matheus Mendonça Santos - November 2025

use dicom_harmonize::cli;

fn main() -> anyhow::Result<()> {
    cli::run()
}
