#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Directory holding the archive fixtures
pub fn data_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("data")
}

/// Packs fixture files into an OMEX archive at `target`
///
/// Each entry is `(location inside the archive, fixture file name)`.
pub fn build_omex(target: &Path, entries: &[(&str, &str)]) -> PathBuf {
    let file = File::create(target).expect("Failed to create archive");
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    for (location, fixture) in entries {
        let content = fs::read(data_dir().join(fixture)).expect("Failed to read fixture");
        zip.start_file(*location, options)
            .expect("Failed to start archive entry");
        zip.write_all(&content).expect("Failed to write archive entry");
    }

    zip.finish().expect("Failed to finish archive");
    target.to_path_buf()
}

/// The decay model with one SED-ML experiment declaring the report `simulation_1`
pub fn decay_omex(dir: &Path) -> PathBuf {
    build_omex(
        &dir.join("decay.omex"),
        &[
            ("manifest.xml", "manifest.xml"),
            ("model.xml", "model.xml"),
            ("simulation_1.sedml", "simulation_1.sedml"),
        ],
    )
}

/// Reads a written report back as header and rows
pub fn read_csv(path: &Path) -> (Vec<String>, Vec<Vec<f64>>) {
    let content = fs::read_to_string(path).expect("Failed to read report");
    let mut lines = content.lines();

    let header = lines
        .next()
        .expect("Report is empty")
        .split(',')
        .map(str::to_string)
        .collect();

    let rows = lines
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.split(',')
                .map(|value| value.parse::<f64>().expect("Not a number"))
                .collect()
        })
        .collect();

    (header, rows)
}

/// Relative paths of all files below `dir`, sorted
pub fn list_files(dir: &Path) -> Vec<String> {
    let mut files = Vec::new();
    collect_files(dir, dir, &mut files);
    files.sort();
    files
}

fn collect_files(root: &Path, dir: &Path, files: &mut Vec<String>) {
    for entry in fs::read_dir(dir).expect("Failed to list directory") {
        let path = entry.expect("Failed to read directory entry").path();
        if path.is_dir() {
            collect_files(root, &path, files);
        } else {
            let relative = path.strip_prefix(root).expect("Path outside root");
            files.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }
}
