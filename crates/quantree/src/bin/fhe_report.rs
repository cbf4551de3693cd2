//! FHE agreement report (not run in CI).
//!
//! Fits every classifier family on synthetic data (plus breast cancer when
//! `QUANTREE_BREAST_CANCER_CSV` is set), compiles it and prints a markdown
//! table of quantized vs float accuracy, circuit size and FHE agreement.
//!
//! Examples:
//! - Virtual execution only:
//!   `cargo run --bin fhe_report --release -- --samples 500 --features 10`
//!
//! - Also run the LWE backend on the first rows:
//!   `cargo run --bin fhe_report --release -- --encrypted --fhe-rows 5 --bits 3 --depth 3`

use std::error::Error;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Instant;

use ndarray::s;
use quantree::testing::{DataSource, check_is_good_execution_for_quantized_models, load_data};
use quantree::{
    BoostingConfig, CompileConfig, Dataset, DecisionTreeClassifier, DecisionTreeConfig, ForestConfig,
    RandomForestClassifier, TreeClassifier, TreeParams, XGBClassifier,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
struct Args {
    samples: usize,
    features: usize,
    trees: u32,
    depth: u32,
    bits: u8,
    seed: u64,
    encrypted: bool,
    fhe_rows: usize,
    out: Option<PathBuf>,
}

fn parse_args() -> Result<Args, Box<dyn Error>> {
    let mut args = Args {
        samples: 500,
        features: 10,
        trees: 10,
        depth: 4,
        bits: 6,
        seed: 42,
        encrypted: false,
        fhe_rows: 5,
        out: None,
    };

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        let mut value = || it.next().ok_or_else(|| format!("{arg} requires a value"));
        match arg.as_str() {
            "--samples" => args.samples = value()?.parse()?,
            "--features" => args.features = value()?.parse()?,
            "--trees" => args.trees = value()?.parse()?,
            "--depth" => args.depth = value()?.parse()?,
            "--bits" => args.bits = value()?.parse()?,
            "--seed" => args.seed = value()?.parse()?,
            "--fhe-rows" => args.fhe_rows = value()?.parse()?,
            "--out" => args.out = Some(PathBuf::from(value()?)),
            "--encrypted" => args.encrypted = true,
            "--help" => {
                print_help();
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}").into()),
        }
    }
    Ok(args)
}

fn print_help() {
    println!(
        "fhe_report\n\n\
         --samples N      synthetic rows (default 500)\n\
         --features N     synthetic columns (default 10)\n\
         --trees N        forest / boosting rounds (default 10)\n\
         --depth N        max tree depth (default 4)\n\
         --bits N         quantization bits (default 6)\n\
         --seed N         data and model seed (default 42)\n\
         --encrypted      also compile and run the LWE backend\n\
         --fhe-rows N     rows compared under FHE (default 5)\n\
         --out PATH       write the table to PATH as well"
    );
}

struct Row {
    dataset: String,
    model: &'static str,
    mode: &'static str,
    quantized_acc: f64,
    reference_acc: f64,
    bit_width: u32,
    n_luts: usize,
    agreement: String,
    fit_ms: f64,
    fhe_ms: f64,
}

fn evaluate<M: TreeClassifier>(
    model: M,
    data: &Dataset,
    dataset: &str,
    args: &Args,
    rows: &mut Vec<Row>,
) -> Result<(), Box<dyn Error>> {
    let (x, y) = (data.features(), data.labels());
    let start = Instant::now();
    let (mut model, reference) = model.fit_benchmark(x, y)?;
    let fit_ms = start.elapsed().as_secs_f64() * 1e3;
    let quantized_acc = model.score(x, y)?;
    let reference_acc = reference.score(x, y)?;

    let n = args.fhe_rows.min(data.n_samples());
    let head = x.slice(s![..n, ..]);
    let config = CompileConfig {
        key_seed: Some(args.seed),
        ..CompileConfig::default()
    };

    let modes: &[(bool, &'static str)] = if args.encrypted {
        &[(true, "virtual"), (false, "encrypted")]
    } else {
        &[(true, "virtual")]
    };
    for &(use_virtual_lib, mode) in modes {
        let (stats, agreement, fhe_ms) = match model.compile(x, &config, use_virtual_lib) {
            Ok(stats) => {
                let start = Instant::now();
                let agreement = match check_is_good_execution_for_quantized_models(head, |x, e| model.predict(x, e)) {
                    Ok(()) => format!("{n}/{n}"),
                    Err(err) => err.to_string(),
                };
                (Some(stats), agreement, start.elapsed().as_secs_f64() * 1e3)
            }
            Err(err) => (None, format!("compile failed: {err}"), 0.0),
        };
        rows.push(Row {
            dataset: dataset.to_string(),
            model: model.kind().name(),
            mode,
            quantized_acc,
            reference_acc,
            bit_width: stats.map_or(0, |s| s.bit_width),
            n_luts: stats.map_or(0, |s| s.luts_per_sample),
            agreement,
            fit_ms,
            fhe_ms,
        });
    }
    Ok(())
}

fn render(rows: &[Row]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "| dataset | model | mode | acc (quantized) | acc (float) | delta | width | LUTs/sample | FHE agreement | fit ms | FHE ms |"
    );
    let _ = writeln!(out, "|---|---|---|---|---|---|---|---|---|---|---|");
    for r in rows {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {:.4} | {:.4} | {:+.4} | {} | {} | {} | {:.1} | {:.1} |",
            r.dataset,
            r.model,
            r.mode,
            r.quantized_acc,
            r.reference_acc,
            r.quantized_acc - r.reference_acc,
            r.bit_width,
            r.n_luts,
            r.agreement,
            r.fit_ms,
            r.fhe_ms
        );
    }
    out
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args()?;
    tracing::info!(?args, "fhe report");

    let sources = [
        DataSource::BreastCancer,
        DataSource::synthetic(args.samples, args.features, 2, args.seed),
        DataSource::synthetic(args.samples, args.features, 4, args.seed),
    ];

    let tree = TreeParams::depth_wise(args.depth);
    let mut rows = Vec::new();
    for source in &sources {
        let Some(data) = load_data(source)? else {
            continue;
        };
        let name = source.to_string();

        let dt = DecisionTreeConfig::builder()
            .n_bits(args.bits)
            .tree(tree.clone())
            .seed(args.seed)
            .build()?;
        evaluate(DecisionTreeClassifier::new(dt), &data, &name, &args, &mut rows)?;

        let rf = ForestConfig::builder()
            .n_bits(args.bits)
            .n_estimators(args.trees)
            .tree(TreeParams {
                max_depth: Some(args.depth),
                ..TreeParams::forest()
            })
            .seed(args.seed)
            .build()?;
        evaluate(RandomForestClassifier::new(rf), &data, &name, &args, &mut rows)?;

        let xgb = BoostingConfig::builder()
            .n_bits(args.bits)
            .n_estimators(args.trees)
            .max_depth(args.depth)
            .seed(args.seed)
            .build()?;
        evaluate(XGBClassifier::new(xgb), &data, &name, &args, &mut rows)?;
    }

    let table = render(&rows);
    print!("{table}");
    if let Some(path) = &args.out {
        std::fs::write(path, &table)?;
        tracing::info!(path = %path.display(), "report written");
    }
    Ok(())
}
