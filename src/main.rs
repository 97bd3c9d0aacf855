use clap::{Args, Parser, Subcommand, ValueEnum};
use comfy_table::{Cell, ContentArrangement, Row, Table, presets::UTF8_FULL};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use enetpath::{
    CoefficientVector, CvMeasure, EngineConfig, EnetError, GridSearchOutcome, RegularizationPath,
    SelectionRule, SolveStatus, fit_path, grid_search, predict, relaxed_path,
};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "enetpath")]
#[command(about = "Elastic-net paths with cross-validated penalty selection", long_about = None)]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Grid search over alpha with k-fold cross-validation; saves the selected model.
    #[command(alias = "train")]
    Fit(FitArgs),
    /// Fit one regularization path and dump every point.
    Path(PathArgs),
    /// Apply a saved model to new rows.
    Predict(PredictArgs),
}

#[derive(Args, Debug)]
struct FitArgs {
    data: PathBuf,
    #[arg(long = "target")]
    target: String,
    /// Comma-separated feature columns; defaults to every column except the target.
    #[arg(long = "features")]
    features: Option<String>,
    /// Comma-separated mixing values, e.g. `0,0.5,1`.
    #[arg(long = "alphas")]
    alphas: Option<String>,
    #[arg(long = "folds")]
    folds: Option<usize>,
    #[arg(long = "seed")]
    seed: Option<u64>,
    #[arg(long = "measure", value_enum)]
    measure: Option<MeasureArg>,
    #[arg(long = "rule", value_enum, default_value_t = RuleArg::Min)]
    rule: RuleArg,
    /// JSON engine configuration; flags override its fields.
    #[arg(long = "config")]
    config: Option<PathBuf>,
    /// Run folds and mixing values on the calling thread.
    #[arg(long = "sequential", default_value_t = false)]
    sequential: bool,
    #[arg(long = "out")]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct PathArgs {
    data: PathBuf,
    #[arg(long = "target")]
    target: String,
    #[arg(long = "features")]
    features: Option<String>,
    #[arg(long = "alpha", default_value_t = 1.0)]
    alpha: f64,
    #[arg(long = "n-lambda")]
    n_lambda: Option<usize>,
    /// Blend weight of the penalized fit in a relaxed refit (1 disables relaxation).
    #[arg(long = "relax-gamma")]
    relax_gamma: Option<f64>,
    #[arg(long = "config")]
    config: Option<PathBuf>,
    #[arg(long = "out")]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct PredictArgs {
    model: PathBuf,
    new_data: PathBuf,
    #[arg(long = "out")]
    out: PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum MeasureArg {
    Mse,
    Mae,
}

impl From<MeasureArg> for CvMeasure {
    fn from(arg: MeasureArg) -> Self {
        match arg {
            MeasureArg::Mse => CvMeasure::Mse,
            MeasureArg::Mae => CvMeasure::Mae,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum RuleArg {
    Min,
    #[value(name = "1se")]
    OneSe,
}

impl From<RuleArg> for SelectionRule {
    fn from(arg: RuleArg) -> Self {
        match arg {
            RuleArg::Min => SelectionRule::Min,
            RuleArg::OneSe => SelectionRule::OneStandardError,
        }
    }
}

const MODEL_VERSION: u32 = 1;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct SavedCurvePoint {
    lambda: f64,
    mean_error: f64,
    standard_error: f64,
    nonzero: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct SavedAlphaSummary {
    alpha: f64,
    #[serde(default)]
    lambda_min: Option<f64>,
    #[serde(default)]
    lambda_1se: Option<f64>,
    #[serde(default)]
    min_error: Option<f64>,
    #[serde(default)]
    failure: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct SavedModel {
    version: u32,
    target: String,
    features: Vec<String>,
    alpha: f64,
    lambda: f64,
    rule: SelectionRule,
    measure: CvMeasure,
    coefficients: CoefficientVector,
    #[serde(default)]
    cv_curve: Vec<SavedCurvePoint>,
    #[serde(default)]
    grid: Vec<SavedAlphaSummary>,
}

#[derive(Clone, Debug)]
struct Dataset {
    headers: Vec<String>,
    values: Array2<f64>,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let cli = Cli::parse();
    match cli.command {
        Command::Fit(args) => run_fit(args),
        Command::Path(args) => run_path(args),
        Command::Predict(args) => run_predict(args),
    }
}

fn run_fit(args: FitArgs) -> Result<(), String> {
    let ds = load_dataset(&args.data)?;
    let (x, y, features) = split_target(&ds, &args.target, args.features.as_deref())?;

    let mut config = load_config(args.config.as_deref())?;
    if let Some(raw) = args.alphas.as_deref() {
        config.grid.alphas = parse_alphas(raw)?;
    }
    if let Some(k) = args.folds {
        config.cv.n_folds = k;
    }
    if let Some(seed) = args.seed {
        config.cv.seed = seed;
    }
    if let Some(measure) = args.measure {
        config.cv.measure = measure.into();
    }
    if args.sequential {
        config.cv.parallel = false;
        config.grid.parallel = false;
    }
    config.validate().map_err(|e| e.to_string())?;

    let outcome = grid_search(
        x.view(),
        y.view(),
        &config.grid,
        &config.cv,
        &config.path,
        None,
    )
    .map_err(|e| e.to_string())?;

    let rule = SelectionRule::from(args.rule);
    print_grid_table(&outcome, config.cv.measure);
    let best = &outcome.best;
    let chosen = best.selected(rule);
    println!(
        "selected | alpha={} | {}={:.6e} | {} {:.6e} ± {:.3e} | nonzero={}",
        outcome.best_alpha,
        rule.label(),
        chosen.lambda,
        config.cv.measure.label(),
        chosen.mean_error,
        chosen.standard_error,
        chosen.nonzero
    );
    report_diagnostics(&best.diagnostics);

    let model = SavedModel {
        version: MODEL_VERSION,
        target: args.target.trim().to_string(),
        features,
        alpha: outcome.best_alpha,
        lambda: chosen.lambda,
        rule,
        measure: config.cv.measure,
        coefficients: chosen.coefficients.clone(),
        cv_curve: best
            .points
            .iter()
            .map(|p| SavedCurvePoint {
                lambda: p.lambda,
                mean_error: p.mean_error,
                standard_error: p.standard_error,
                nonzero: p.nonzero,
            })
            .collect(),
        grid: outcome
            .candidates
            .iter()
            .map(|c| match &c.outcome {
                Ok(cv) => SavedAlphaSummary {
                    alpha: c.alpha,
                    lambda_min: Some(cv.lambda_min().lambda),
                    lambda_1se: Some(cv.lambda_1se().lambda),
                    min_error: Some(cv.lambda_min().mean_error),
                    failure: None,
                },
                Err(e) => SavedAlphaSummary {
                    alpha: c.alpha,
                    lambda_min: None,
                    lambda_1se: None,
                    min_error: None,
                    failure: Some(e.to_string()),
                },
            })
            .collect(),
    };
    if let Some(out) = args.out.as_deref() {
        write_model_json(out, &model)?;
    }
    Ok(())
}

fn run_path(args: PathArgs) -> Result<(), String> {
    let ds = load_dataset(&args.data)?;
    let (x, y, features) = split_target(&ds, &args.target, args.features.as_deref())?;
    let mut config = load_config(args.config.as_deref())?;
    if let Some(n) = args.n_lambda {
        config.path.n_lambda = n;
    }
    config.path.validate().map_err(|e| e.to_string())?;

    let mut path = fit_path(x.view(), y.view(), args.alpha, None, &config.path)
        .map_err(|e| e.to_string())?;
    if let Some(gamma) = args.relax_gamma {
        path = relaxed_path(x.view(), y.view(), &path, gamma).map_err(|e| e.to_string())?;
    }
    report_diagnostics(&path.diagnostics);

    match args.out.as_deref() {
        Some(out) => {
            write_path_csv(out, &path, &features)?;
            println!("saved path: {}", out.display());
        }
        None => print_path_table(&path),
    }
    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<(), String> {
    let payload = fs::read_to_string(&args.model)
        .map_err(|e| format!("failed to read model '{}': {e}", args.model.display()))?;
    let model: SavedModel =
        serde_json::from_str(&payload).map_err(|e| format!("failed to parse model json: {e}"))?;
    if model.version != MODEL_VERSION {
        return Err(format!(
            "model version {} is not supported (expected {MODEL_VERSION})",
            model.version
        ));
    }

    let ds = load_dataset(&args.new_data)?;
    let col_map = column_map(&ds.headers);
    let indices = model
        .features
        .iter()
        .map(|name| resolve_col(&col_map, name))
        .collect::<Result<Vec<_>, _>>()?;
    let x = ds.values.select(Axis(1), &indices);
    let preds = predict(&model.coefficients, x.view()).map_err(|e| e.to_string())?;
    write_prediction_csv(&args.out, &preds)?;
    println!("wrote {} predictions: {}", preds.len(), args.out.display());
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, String> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let payload = fs::read_to_string(path)
        .map_err(|e| format!("failed to read config '{}': {e}", path.display()))?;
    serde_json::from_str(&payload).map_err(|e| format!("failed to parse config json: {e}"))
}

fn parse_alphas(raw: &str) -> Result<Vec<f64>, String> {
    let alphas = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>()
                .map_err(|_| format!("invalid alpha value '{s}'"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if alphas.is_empty() {
        return Err("--alphas cannot be empty".to_string());
    }
    Ok(alphas)
}

fn load_dataset(path: &Path) -> Result<Dataset, String> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| format!("failed to open csv '{}': {e}", path.display()))?;

    let headers = rdr
        .headers()
        .map_err(|e| format!("failed to read csv headers: {e}"))?
        .iter()
        .map(|s| s.trim().to_string())
        .collect::<Vec<_>>();
    if headers.is_empty() {
        return Err("csv has no headers".to_string());
    }

    let mut records = Vec::<StringRecord>::new();
    for rec in rdr.records() {
        let record = rec.map_err(|e| format!("failed reading csv row: {e}"))?;
        if record.len() != headers.len() {
            return Err(format!(
                "csv row width mismatch: got {} fields, expected {}",
                record.len(),
                headers.len()
            ));
        }
        records.push(record);
    }
    if records.is_empty() {
        return Err("csv has no rows".to_string());
    }

    let mut values = Array2::<f64>::zeros((records.len(), headers.len()));
    for (i, rec) in records.iter().enumerate() {
        for (j, raw) in rec.iter().enumerate() {
            let raw = raw.trim();
            let v = raw.parse::<f64>().map_err(|_| {
                format!(
                    "non-numeric value '{raw}' at row {}, column '{}'; encode categorical columns before fitting",
                    i + 1,
                    headers[j]
                )
            })?;
            if !v.is_finite() {
                return Err(format!(
                    "non-finite value at row {}, column '{}'",
                    i + 1,
                    headers[j]
                ));
            }
            values[[i, j]] = v;
        }
    }

    Ok(Dataset { headers, values })
}

fn column_map(headers: &[String]) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.clone(), i))
        .collect()
}

fn resolve_col(col_map: &HashMap<String, usize>, name: &str) -> Result<usize, String> {
    col_map
        .get(name)
        .copied()
        .ok_or_else(|| format!("column '{name}' not found"))
}

fn split_target(
    ds: &Dataset,
    target: &str,
    features: Option<&str>,
) -> Result<(Array2<f64>, Array1<f64>, Vec<String>), String> {
    let target = target.trim();
    if target.is_empty() {
        return Err("--target cannot be empty".to_string());
    }
    let col_map = column_map(&ds.headers);
    let target_col = resolve_col(&col_map, target)?;
    let names: Vec<String> = match features {
        Some(raw) => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => ds
            .headers
            .iter()
            .filter(|h| h.as_str() != target)
            .cloned()
            .collect(),
    };
    if names.is_empty() {
        return Err("no feature columns selected".to_string());
    }
    let indices = names
        .iter()
        .map(|name| {
            let j = resolve_col(&col_map, name)?;
            if j == target_col {
                return Err(format!("target column '{name}' cannot also be a feature"));
            }
            Ok(j)
        })
        .collect::<Result<Vec<_>, String>>()?;
    let x = ds.values.select(Axis(1), &indices);
    let y = ds.values.column(target_col).to_owned();
    Ok((x, y, names))
}

fn report_diagnostics(diagnostics: &[EnetError]) {
    if diagnostics.is_empty() {
        return;
    }
    println!("{} diagnostic(s):", diagnostics.len());
    for d in diagnostics.iter().take(10) {
        println!("  - {d}");
    }
    if diagnostics.len() > 10 {
        println!("  ... {} more", diagnostics.len() - 10);
    }
}

fn print_grid_table(outcome: &GridSearchOutcome, measure: CvMeasure) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "Alpha".to_string(),
            "Lambda min".to_string(),
            format!("CV {}", measure.label()),
            "Nonzero".to_string(),
            "Lambda 1se".to_string(),
            "Status".to_string(),
        ]);
    for (i, c) in outcome.candidates.iter().enumerate() {
        let row = match &c.outcome {
            Ok(cv) => {
                let min = cv.lambda_min();
                vec![
                    Cell::new(format!("{:.2}", c.alpha)),
                    Cell::new(format!("{:.4e}", min.lambda)),
                    Cell::new(format!("{:.6} ± {:.4}", min.mean_error, min.standard_error)),
                    Cell::new(min.nonzero),
                    Cell::new(format!("{:.4e}", cv.lambda_1se().lambda)),
                    Cell::new(if i == outcome.best_index { "best" } else { "ok" }),
                ]
            }
            Err(EnetError::Cancelled) => vec![
                Cell::new(format!("{:.2}", c.alpha)),
                Cell::new("-"),
                Cell::new("-"),
                Cell::new("-"),
                Cell::new("-"),
                Cell::new("cancelled"),
            ],
            Err(_) => vec![
                Cell::new(format!("{:.2}", c.alpha)),
                Cell::new("-"),
                Cell::new("-"),
                Cell::new("-"),
                Cell::new("-"),
                Cell::new("failed"),
            ],
        };
        table.add_row(Row::from(row));
    }
    println!("{table}");
    for (alpha, e) in outcome.failures() {
        if !matches!(e, EnetError::Cancelled) {
            println!("alpha {alpha}: {e}");
        }
    }
}

fn print_path_table(path: &RegularizationPath) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Lambda", "Active", "Dev ratio", "Sweeps", "Status"]);
    for point in &path.points {
        table.add_row(Row::from(vec![
            Cell::new(format!("{:.4e}", point.lambda)),
            Cell::new(point.active_count),
            Cell::new(format!("{:.4}", point.deviance_ratio)),
            Cell::new(point.iterations),
            Cell::new(match point.status {
                SolveStatus::Converged => "converged",
                SolveStatus::MaxIterationsReached => "capped",
            }),
        ]));
    }
    println!("alpha={}", path.alpha);
    println!("{table}");
}

fn write_model_json(path: &Path, model: &SavedModel) -> Result<(), String> {
    let payload = serde_json::to_string_pretty(model)
        .map_err(|e| format!("failed to serialize model: {e}"))?;
    fs::write(path, payload)
        .map_err(|e| format!("failed to write model '{}': {e}", path.display()))?;
    println!("saved model: {}", path.display());
    Ok(())
}

fn write_path_csv(path: &Path, reg: &RegularizationPath, features: &[String]) -> Result<(), String> {
    let mut wtr = WriterBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| format!("failed to create output csv '{}': {e}", path.display()))?;
    let mut header = vec![
        "lambda".to_string(),
        "active".to_string(),
        "deviance_ratio".to_string(),
        "intercept".to_string(),
    ];
    header.extend(features.iter().cloned());
    wtr.write_record(&header)
        .map_err(|e| format!("failed to write csv header: {e}"))?;
    for (i, point) in reg.points.iter().enumerate() {
        let mut row = vec![
            format!("{:.12e}", point.lambda),
            point.active_count.to_string(),
            format!("{:.12}", point.deviance_ratio),
            format!("{:.12}", point.coefficients.intercept),
        ];
        row.extend(point.coefficients.weights.iter().map(|w| format!("{w:.12}")));
        wtr.write_record(&row)
            .map_err(|e| format!("failed to write csv row {i}: {e}"))?;
    }
    wtr.flush()
        .map_err(|e| format!("failed to flush csv writer: {e}"))?;
    Ok(())
}

fn write_prediction_csv(path: &Path, preds: &Array1<f64>) -> Result<(), String> {
    let mut wtr = WriterBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| format!("failed to create output csv '{}': {e}", path.display()))?;
    wtr.write_record(["prediction"])
        .map_err(|e| format!("failed writing csv header: {e}"))?;
    for (i, v) in preds.iter().enumerate() {
        wtr.write_record([format!("{v:.12}")])
            .map_err(|e| format!("failed to write csv row {i}: {e}"))?;
    }
    wtr.flush()
        .map_err(|e| format!("failed to flush csv writer: {e}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write as _;

    fn write_training_csv(dir: &Path) -> PathBuf {
        let mut text = String::from("a,b,noise,y\n");
        for i in 0..60 {
            let a = (i as f64 * 0.37).sin();
            let b = (i as f64 * 0.11).cos();
            let noise = ((i * 17) % 11) as f64 / 11.0;
            let y = 3.0 * a - 1.0 * b + 0.01 * noise;
            writeln!(text, "{a},{b},{noise},{y}").unwrap();
        }
        let path = dir.join("train.csv");
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn non_numeric_cells_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(&path, "x,y\n1,2\nred,3\n").unwrap();
        let err = load_dataset(&path).unwrap_err();
        assert!(err.contains("non-numeric value 'red'"));
        assert!(err.contains("column 'x'"));
    }

    #[test]
    fn alpha_list_parses_and_rejects_garbage() {
        assert_eq!(parse_alphas("0, 0.5,1").unwrap(), vec![0.0, 0.5, 1.0]);
        assert!(parse_alphas("").is_err());
        assert!(parse_alphas("0.5,abc").is_err());
    }

    #[test]
    fn target_cannot_double_as_feature() {
        let ds = Dataset {
            headers: vec!["a".into(), "y".into()],
            values: Array2::zeros((3, 2)),
        };
        assert!(split_target(&ds, "y", Some("a,y")).is_err());
        let (x, y, names) = split_target(&ds, "y", None).unwrap();
        assert_eq!(names, vec!["a".to_string()]);
        assert_eq!(x.ncols(), 1);
        assert_eq!(y.len(), 3);
    }

    #[test]
    fn fit_then_predict_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let train = write_training_csv(dir.path());
        let model_path = dir.path().join("model.json");
        run_fit(FitArgs {
            data: train.clone(),
            target: "y".to_string(),
            features: None,
            alphas: Some("0.5,1".to_string()),
            folds: Some(5),
            seed: Some(1),
            measure: None,
            rule: RuleArg::Min,
            config: None,
            sequential: true,
            out: Some(model_path.clone()),
        })
        .unwrap();

        let model: SavedModel =
            serde_json::from_str(&fs::read_to_string(&model_path).unwrap()).unwrap();
        assert_eq!(model.version, MODEL_VERSION);
        assert_eq!(model.features, vec!["a", "b", "noise"]);
        assert_eq!(model.grid.len(), 2);
        assert!(!model.cv_curve.is_empty());

        // Reorder the columns; prediction must select them by header.
        let new_csv = dir.path().join("new.csv");
        fs::write(&new_csv, "noise,b,a\n0.0,1.0,0.5\n0.0,0.0,0.0\n").unwrap();
        let preds_path = dir.path().join("preds.csv");
        run_predict(PredictArgs {
            model: model_path,
            new_data: new_csv,
            out: preds_path.clone(),
        })
        .unwrap();
        let text = fs::read_to_string(&preds_path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "prediction");
        let first: f64 = lines[1].parse().unwrap();
        assert!((first - (3.0 * 0.5 - 1.0)).abs() < 0.05);
    }

    #[test]
    fn predict_reports_missing_columns() {
        let dir = tempfile::tempdir().unwrap();
        let model = SavedModel {
            version: MODEL_VERSION,
            target: "y".to_string(),
            features: vec!["a".to_string(), "b".to_string()],
            alpha: 1.0,
            lambda: 0.1,
            rule: SelectionRule::Min,
            measure: CvMeasure::Mse,
            coefficients: CoefficientVector::new(0.0, ndarray::array![1.0, 2.0]),
            cv_curve: Vec::new(),
            grid: Vec::new(),
        };
        let model_path = dir.path().join("model.json");
        write_model_json(&model_path, &model).unwrap();
        let new_csv = dir.path().join("new.csv");
        fs::write(&new_csv, "a\n1.0\n").unwrap();
        let err = run_predict(PredictArgs {
            model: model_path,
            new_data: new_csv,
            out: dir.path().join("out.csv"),
        })
        .unwrap_err();
        assert!(err.contains("column 'b' not found"));
    }

    #[test]
    fn path_command_writes_one_row_per_penalty() {
        let dir = tempfile::tempdir().unwrap();
        let train = write_training_csv(dir.path());
        let out = dir.path().join("path.csv");
        run_path(PathArgs {
            data: train,
            target: "y".to_string(),
            features: Some("a,b".to_string()),
            alpha: 1.0,
            n_lambda: Some(12),
            relax_gamma: Some(0.5),
            config: None,
            out: Some(out.clone()),
        })
        .unwrap();
        let text = fs::read_to_string(&out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("lambda,active,deviance_ratio,intercept,a,b")
        );
        assert_eq!(lines.count(), 12);
    }
}
