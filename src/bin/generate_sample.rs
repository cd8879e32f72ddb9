//! Write a small synthetic data tree matching `config/ageing.json`:
//!
//! ```text
//! DATA/
//!   tables/targets.csv
//!   lightcurve_data/<ORID>/CH_<ORID>_TU<date>_R25_V0300.fits   UTC_TIME, FLUX, BACKGROUND, ...
//!   PIPE_lightcurve/<ORID>/CH_<ORID>_TU<date>_sa.fits          MJD_TIME, FLUX, BG, XC, YC, ...
//!   general_report/<ORID>/CH_<ORID>_TU<date>_general.fits      PSF shape rows
//! ```
//!
//! Usage: `generate_sample [out_dir]` (default `DATA`).

use std::fs;
use std::path::{Path, PathBuf};

use ageing_monitor::fits::{write_fits, Column, Header, HeaderValue, TableHdu};
use ageing_monitor::time::mjd_to_datetime;
use anyhow::{Context, Result};

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5)).rotate_left(7).wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

struct Visit {
    target: &'static str,
    orid: &'static str,
    /// Start of the visit, MJD.
    start: f64,
}

const VISITS: [Visit; 6] = [
    Visit { target: "WASP-43", orid: "PR100018_TG000101", start: 59366.10 },
    Visit { target: "WASP-43", orid: "PR100018_TG000102", start: 59584.40 },
    Visit { target: "HD 88111", orid: "PR100018_TG000201", start: 59400.75 },
    Visit { target: "HD 88111", orid: "PR100018_TG000202", start: 59750.20 },
    Visit { target: "KELT-11", orid: "PR300005_TG000301", start: 59950.60 },
    Visit { target: "KELT-11", orid: "PR300005_TG000302", start: 60120.05 },
];

/// Samples per visit at one-minute cadence (8 hours).
const SAMPLES: usize = 480;

fn timestamp_token(mjd: f64) -> String {
    mjd_to_datetime(mjd)
        .map(|dt| dt.format("%Y-%m-%dT%H-%M-%S").to_string())
        .unwrap_or_default()
}

fn iso_stamp(mjd: f64) -> String {
    mjd_to_datetime(mjd)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.3f").to_string())
        .unwrap_or_default()
}

fn visit_file(root: &Path, family: &str, visit: &Visit, suffix: &str) -> Result<PathBuf> {
    let dir = root.join(family).join(format!("{}_V0300", visit.orid));
    fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    Ok(dir.join(format!("CH_{}_TU{}_{suffix}.fits", visit.orid, timestamp_token(visit.start))))
}

fn primary(visit: &Visit) -> Header {
    Header::new()
        .with("TARGNAME", HeaderValue::Str(visit.target.to_string()))
        .with("OBSID", HeaderValue::Str(visit.orid.to_string()))
}

fn write_targets(root: &Path) -> Result<()> {
    let dir = root.join("tables");
    fs::create_dir_all(&dir)?;
    let mut writer = csv::Writer::from_path(dir.join("targets.csv"))?;
    writer.write_record(["Target", "OR ID", "Date of visit", "Year"])?;
    for visit in &VISITS {
        let date = mjd_to_datetime(visit.start)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        let year = date.get(..4).unwrap_or_default().to_string();
        writer.write_record([visit.target, visit.orid, date.as_str(), year.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_lightcurve(root: &Path, visit: &Visit, ageing: f64, rng: &mut SimpleRng) -> Result<()> {
    let mjd: Vec<f64> = (0..SAMPLES).map(|i| visit.start + i as f64 / 1440.0).collect();
    let flux: Vec<f64> = (0..SAMPLES)
        .map(|i| {
            // A rare cosmic-ray hit and a dropped sample per visit.
            match i {
                97 => 2.0e6,
                311 => f64::NAN,
                _ => rng.gauss(1.0e5 * (1.0 - ageing), 120.0 * (1.0 + ageing * 10.0)),
            }
        })
        .collect();
    let background: Vec<f64> = (0..SAMPLES).map(|_| rng.gauss(350.0, 15.0)).collect();
    let conta: Vec<f64> = (0..SAMPLES).map(|_| rng.gauss(0.02, 0.002)).collect();
    let smearing: Vec<f64> = (0..SAMPLES).map(|_| rng.gauss(4.0, 0.3)).collect();

    let table = TableHdu::new("SCI_COR_Lightcurve")
        .with_card("TIMESYS", HeaderValue::Str("UTC".to_string()))
        .with_column(Column::text("UTC_TIME", mjd.iter().map(|&t| iso_stamp(t))))
        .with_column(Column::numeric("MJD_TIME", mjd))
        .with_column(Column::numeric("FLUX", flux))
        .with_column(Column::numeric("BACKGROUND", background))
        .with_column(Column::numeric("CONTA_LC", conta))
        .with_column(Column::numeric("SMEARING_LC", smearing));
    let path = visit_file(root, "lightcurve_data", visit, "R25_V0300")?;
    write_fits(&path, &primary(visit), &[table])?;
    Ok(())
}

fn write_pipe(root: &Path, visit: &Visit, ageing: f64, rng: &mut SimpleRng) -> Result<()> {
    let mjd: Vec<f64> = (0..SAMPLES).map(|i| visit.start + i as f64 / 1440.0).collect();
    let roll: Vec<f64> = (0..SAMPLES).map(|i| (i as f64 * 0.75) % 360.0).collect();
    let flux: Vec<f64> = roll
        .iter()
        .map(|r| rng.gauss(9.8e4 * (1.0 - ageing), 150.0) + 40.0 * r.to_radians().sin())
        .collect();
    let fluxerr: Vec<f64> = (0..SAMPLES).map(|_| rng.gauss(160.0, 5.0)).collect();
    let bg: Vec<f64> = (0..SAMPLES).map(|_| rng.gauss(3.0, 0.4)).collect();
    let xc: Vec<f64> = (0..SAMPLES).map(|_| rng.gauss(100.0 + ageing * 4.0, 0.05)).collect();
    let yc: Vec<f64> = (0..SAMPLES).map(|_| rng.gauss(100.0, 0.05)).collect();
    let therm: Vec<f64> = (0..SAMPLES).map(|_| rng.gauss(-10.0, 0.1)).collect();

    let table = TableHdu::new("PIPE")
        .with_column(Column::numeric("MJD_TIME", mjd))
        .with_column(Column::numeric("FLUX", flux))
        .with_column(Column::numeric("FLUXERR", fluxerr))
        .with_column(Column::numeric("BG", bg))
        .with_column(Column::numeric("XC", xc))
        .with_column(Column::numeric("YC", yc))
        .with_column(Column::numeric("ROLL", roll))
        .with_column(Column::numeric("thermFront_2", therm));
    let path = visit_file(root, "PIPE_lightcurve", visit, "sa")?;
    write_fits(&path, &primary(visit), &[table])?;
    Ok(())
}

fn write_general(root: &Path, visit: &Visit, ageing: f64, rng: &mut SimpleRng) -> Result<()> {
    let rows = 4;
    let mut table = TableHdu::new("PSF_SHAPE").with_column(Column::numeric(
        "cntr",
        (0..rows).map(|i| i as f64).collect(),
    ));
    for (name, mean, spread) in [
        ("loc_x", 512.0, 2.0),
        ("loc_y", 512.0, 2.0),
        ("sx_std", 1.1 + ageing, 0.02),
        ("sy_std", 1.2 + ageing, 0.02),
        ("rx_avr", 8.0 + ageing * 3.0, 0.1),
        ("ry_avr", 8.2 + ageing * 3.0, 0.1),
        ("h_avr", 2.4e4 * (1.0 - ageing), 150.0),
        ("h_max", 3.0e4 * (1.0 - ageing), 200.0),
    ] {
        let values: Vec<f64> = (0..rows).map(|_| rng.gauss(mean, spread)).collect();
        table = table.with_column(Column::numeric(name, values));
    }
    let path = visit_file(root, "general_report", visit, "general")?;
    write_fits(&path, &primary(visit), &[table])?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let root = PathBuf::from(std::env::args().nth(1).unwrap_or_else(|| "DATA".to_string()));
    let mut rng = SimpleRng::new(42);

    write_targets(&root)?;
    let first = VISITS[0].start;
    for visit in &VISITS {
        // Slow degradation with mission time: 0.5 % per year.
        let ageing = (visit.start - first) / 365.25 * 0.005;
        write_lightcurve(&root, visit, ageing, &mut rng)?;
        write_pipe(&root, visit, ageing, &mut rng)?;
        write_general(&root, visit, ageing, &mut rng)?;
    }

    println!(
        "Wrote {} visits ({} samples each) under {}",
        VISITS.len(),
        SAMPLES,
        root.display()
    );
    Ok(())
}
