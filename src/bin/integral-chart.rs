use log::{error, info};
use serde::Deserialize;
use std::error::Error;
use std::fs;
use std::path::Path;

use plotters::prelude::*;

use kalkulator_integralny::analytical::antiderivative;
use kalkulator_integralny::{
    compile, ErrorKind, Quadrature, QuadratureConfig, QuadratureRequest, QuadratureResult,
    Resolution, Rule,
};

const INPUT_PATH: &str = "data/integrals.csv";
const CONFIG_PATH: &str = "data/config.json";
const PLOTS_DIR: &str = "plots";
const TABLES_DIR: &str = "tables";

#[derive(Deserialize, Debug)]
struct IntegralRow {
    name: String,
    rule: Rule,

    #[serde(rename = "function")]
    expression: String,

    #[serde(rename = "lower_bound")]
    lower: f64,
    #[serde(rename = "upper_bound")]
    upper: f64,

    n_intervals: Option<f64>,
    h_value: Option<f64>,
}

fn padded(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (low, high) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(low, high), v| {
        (low.min(v), high.max(v))
    });
    let pad = if high > low { (high - low) * 0.05 } else { 1. };
    (low - pad, high + pad)
}

fn plot(result: &QuadratureResult, path: &Path) -> Result<(), Box<dyn Error>> {
    let drawing_area = SVGBackend::new(path, (800, 600)).into_drawing_area();
    drawing_area.fill(&WHITE)?;

    let (x_min, x_max) = padded(result.smooth_curve.iter().map(|&(x, _)| x));
    let (y_min, y_max) = padded(
        result
            .smooth_curve
            .iter()
            .map(|&(_, y)| y)
            .chain(std::iter::once(0.)),
    );

    let mut chart_builder = ChartBuilder::on(&drawing_area);

    let mut chart_context = chart_builder
        .caption(
            format!("∫ {} dx, {} rule, n = {}", result.expression, result.rule, result.resolution_used),
            ("sans-serif", 20),
        )
        .margin(40)
        .set_label_area_size(LabelAreaPosition::Left, 40)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;

    chart_context
        .configure_mesh()
        .x_desc("x")
        .y_desc("f(x)")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    chart_context
        .draw_series(LineSeries::new(result.smooth_curve.iter().copied(), &BLUE))?
        .label("f(x)")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE));

    chart_context
        .draw_series(LineSeries::new(
            result.node_table.iter().map(|node| (node.x, node.fx)),
            &RED,
        ))?
        .label("nodes")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED));

    chart_context.draw_series(
        result
            .node_table
            .iter()
            .map(|node| Circle::new((node.x, node.fx), 3, RED.filled())),
    )?;

    chart_context
        .configure_series_labels()
        .border_style(BLACK)
        .background_style(WHITE.mix(0.8))
        .draw()?;

    drawing_area.present()?;

    Ok(())
}

fn write_table(result: &QuadratureResult, path: &Path) -> Result<(), Box<dyn Error>> {
    let mut writer = csv::Writer::from_path(path)?;
    for node in &result.node_table {
        writer.serialize(node)?;
    }
    writer.flush()?;
    Ok(())
}

fn report(row: &IntegralRow, result: &QuadratureResult) {
    let analytical = match result.analytical.value() {
        Some(value) => format!("{value:.6}"),
        None => "unavailable".to_string(),
    };
    println!(
        "{}: {} rule, n = {}, h = {:.4}, result = {:.6}, analytical = {}",
        row.name, result.rule, result.resolution_used, result.step_used, result.approx_value, analytical
    );

    if result.resolution_used != result.resolution_requested {
        println!(
            "  n adjusted from {} to {}",
            result.resolution_requested, result.resolution_used
        );
    }

    if let Some(error) = result.error {
        match error.relative_percent {
            Some(relative) => println!("  absolute error = {:.6}, relative error = {relative:.4}%", error.absolute),
            None => println!("  absolute error = {:.6}", error.absolute),
        }
    }

    if let Some(closed_form) = compile(&row.expression).ok().as_ref().and_then(antiderivative) {
        println!("  F(x) = {closed_form}");
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let config = if Path::new(CONFIG_PATH).exists() {
        QuadratureConfig::from_reader(CONFIG_PATH)?
    } else {
        QuadratureConfig::default()
    };
    let quadrature = Quadrature::with_config(config)?;

    let rows: Vec<IntegralRow> = csv::Reader::from_path(INPUT_PATH)?
        .deserialize()
        .collect::<Result<_, _>>()?;
    info!("loaded {} integrals from {INPUT_PATH}", rows.len());

    fs::create_dir_all(PLOTS_DIR)?;
    fs::create_dir_all(TABLES_DIR)?;

    for row in &rows {
        let outcome = Resolution::from_fields(row.n_intervals, row.h_value).and_then(|resolution| {
            let request = QuadratureRequest::new(row.expression.as_str(), row.lower, row.upper, resolution);
            quadrature.compute(row.rule, &request)
        });

        let result = match outcome {
            Ok(result) => result,
            Err(err) => {
                match err.kind() {
                    ErrorKind::Parameter => error!("{}: invalid input: {err}", row.name),
                    ErrorKind::Evaluation => error!("{}: {err}", row.name),
                }
                continue;
            }
        };

        report(row, &result);

        write_table(&result, &Path::new(TABLES_DIR).join(format!("{}.csv", row.name)))?;
        plot(&result, &Path::new(PLOTS_DIR).join(format!("{}.svg", row.name)))?;
    }

    Ok(())
}
