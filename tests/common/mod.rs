#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use ageing_monitor::fits::{write_fits, Column, Header, HeaderValue, TableHdu};
use ageing_monitor::PipelineConfig;

/// Pipeline configuration over `root/lc` (statistics) and `root/report`
/// (direct values), with the reference table at `root/targets.csv`.
pub fn config(root: &Path) -> PipelineConfig {
    let text = r#"{
        "targets_table": "targets.csv",
        "sources": {
            "lc": {
                "directory": "lc",
                "pattern": "**/*_lc.fits",
                "exclude": ["_Fixed"],
                "lightcurve": true
            },
            "report": {
                "directory": "report",
                "pattern": "**/*_general.fits",
                "table": { "by_name_substring": "PSF" }
            }
        },
        "analyses": [
            {
                "name": "flux",
                "source": "lc",
                "parameters": [
                    { "name": "Flux", "columns": ["FLUX"] },
                    { "name": "Background", "columns": ["BKG"] }
                ]
            },
            {
                "name": "psf",
                "source": "report",
                "calculate_stats": false,
                "parameters": [ { "name": "Shape", "columns": ["sx", "sy"] } ]
            }
        ],
        "accessibility": [
            { "source": "lc", "label": "Lightcurve" },
            { "source": "report", "label": "Report" }
        ]
    }"#;
    PipelineConfig::from_json_str(text, root).unwrap()
}

pub fn write_targets(root: &Path, rows: &[(&str, &str)]) {
    let mut text = String::from("Target,OR ID,Date of visit,Year\n");
    for (target, orid) in rows {
        text.push_str(&format!("{target},{orid},,2022\n"));
    }
    fs::write(root.join("targets.csv"), text).unwrap();
}

/// Flux values with a small repeating pattern around `level`.
pub fn flux(level: f64, n: usize) -> Vec<f64> {
    (0..n).map(|i| level + (i % 10) as f64).collect()
}

/// Lightcurve file at `root/lc/<relative>` with one-minute ISO timestamps
/// starting at midnight of `date`.
pub fn write_lightcurve(root: &Path, relative: &str, date: &str, flux: Vec<f64>, targname: Option<&str>) -> PathBuf {
    let path = root.join("lc").join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();

    let n = flux.len();
    let stamps: Vec<String> = (0..n)
        .map(|i| format!("{date}T{:02}:{:02}:00.000", i / 60, i % 60))
        .collect();
    let background: Vec<f64> = (0..n).map(|i| 50.0 + (i % 3) as f64).collect();

    let mut primary = Header::new();
    if let Some(name) = targname {
        primary.set("TARGNAME", HeaderValue::Str(name.to_string()));
    }
    let table = TableHdu::new("SCI_COR_Lightcurve")
        .with_column(Column::text("UTC_TIME", stamps))
        .with_column(Column::numeric("FLUX", flux))
        .with_column(Column::numeric("BKG", background));
    write_fits(&path, &primary, &[table]).unwrap();
    path
}

/// General report with a PSF table of `rows` rows.
pub fn write_report(root: &Path, relative: &str, rows: usize) -> PathBuf {
    let path = root.join("report").join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let table = TableHdu::new("PSF_SHAPE")
        .with_column(Column::numeric("sx", (0..rows).map(|i| 1.0 + i as f64 * 0.1).collect()))
        .with_column(Column::numeric("sy", (0..rows).map(|i| 2.0 + i as f64 * 0.1).collect()));
    write_fits(&path, &Header::new(), &[TableHdu::new("HK"), table]).unwrap();
    path
}

/// Lightcurve-named file whose table header claims far more rows than the
/// file holds.
pub fn write_oversized(root: &Path, relative: &str) -> PathBuf {
    let path = root.join("lc").join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();

    let primary = ["SIMPLE  =                    T", "BITPIX  =                    8", "NAXIS   =                    0"];
    let table = [
        "XTENSION= 'BINTABLE'",
        "BITPIX  =                    8",
        "NAXIS   =                    2",
        "NAXIS1  =                    8",
        "NAXIS2  =  4611686018427387904",
        "PCOUNT  =                    0",
        "GCOUNT  =                    1",
        "TFIELDS =                    1",
        "TTYPE1  = 'FLUX'",
        "TFORM1  = 'D'",
    ];
    let mut bytes = Vec::new();
    for cards in [&primary[..], &table[..]] {
        let mut block: String = cards.iter().chain(["END"].iter()).map(|c| format!("{c:<80}")).collect();
        block = format!("{block:<2880}");
        bytes.extend(block.into_bytes());
    }
    bytes.extend(vec![0u8; 2880]);
    fs::write(&path, bytes).unwrap();
    path
}
