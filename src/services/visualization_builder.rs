//! Visualization Builder (C7) — turns an `AnalyticsResult` into a pure,
//! Plotly-compatible JSON chart spec. No rendering happens here.
//!
//! Ported from the original implementation's `AnalyticsService._format_evolution`
//! / `_format_ranking` family and `visualization_service.py`'s bank palette.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::models::analytics::{AnalyticsResult, AnalyticsResultType, MetricRow, RankingEntry};
use crate::models::metric::BetterDirection;
use crate::services::metric_registry;

const INVEX_COLOR: &str = "#E45756";
const SISTEMA_COLOR: &str = "#AAB0B3";
const DEFAULT_COLOR: &str = "#4F46E5";

static BANK_COLORS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("INVEX", INVEX_COLOR),
        ("SISTEMA", SISTEMA_COLOR),
        ("BBVA", "#004481"),
        ("SANTANDER", "#EC0000"),
        ("BANORTE", "#D7282F"),
        ("HSBC", "#DB0011"),
        ("SCOTIABANK", "#EC1C24"),
        ("INBURSA", "#003DA5"),
        ("CITIBANAMEX", "#0065B3"),
        ("BANAMEX", "#0065B3"),
        ("AZTECA", "#00A651"),
        ("AFIRME", "#005EB8"),
    ])
});

/// Deterministic per-bank color: exact match, then substring match, then a
/// stable fallback so the same bank always renders the same color.
fn bank_color(bank_name: &str) -> &'static str {
    let normalized = bank_name.trim().to_uppercase();
    if let Some(color) = BANK_COLORS.get(normalized.as_str()) {
        return color;
    }
    for (key, color) in BANK_COLORS.iter() {
        if normalized.contains(key) {
            return color;
        }
    }
    DEFAULT_COLOR
}

/// Builds the `plotly_config` JSON for an `AnalyticsResult` and returns the
/// result with `plotly_config` populated. `result_type != Data` is passed
/// through unchanged — there is nothing to chart.
pub fn build_chart(mut result: AnalyticsResult) -> AnalyticsResult {
    if result.result_type != AnalyticsResultType::Data {
        return result;
    }

    let config = if !result.ranking.is_empty() {
        ranking_layout(&result)
    } else {
        match result.visualization.as_str() {
            "table" => table_layout(&result),
            "variation" => variation_layout(&result),
            "single_series" => single_series_layout(&result),
            "yoy" => yoy_layout(&result),
            "comparison" => comparison_layout(&result),
            "stacked" => stacked_layout(&result),
            _ => evolution_layout(&result),
        }
    };

    result.plotly_config = config;
    result
}

fn is_ratio(result: &AnalyticsResult) -> bool {
    result.metric_type == "ratio"
}

fn value_axis_title(result: &AnalyticsResult) -> &'static str {
    if is_ratio(result) {
        "%"
    } else {
        "MDP (Millones de Pesos)"
    }
}

fn trace_style(banco: &str) -> (serde_json::Value, serde_json::Value, &'static str) {
    let upper = banco.trim().to_uppercase();
    if upper == "INVEX" {
        (
            serde_json::json!({ "color": INVEX_COLOR, "width": 4 }),
            serde_json::json!({ "size": 8, "symbol": "circle", "color": INVEX_COLOR }),
            "lines+markers",
        )
    } else if upper == "SISTEMA" {
        (
            serde_json::json!({ "color": SISTEMA_COLOR, "width": 3, "dash": "dash" }),
            serde_json::json!({ "size": 6, "symbol": "diamond", "color": SISTEMA_COLOR }),
            "lines+markers",
        )
    } else {
        let color = bank_color(banco);
        (serde_json::json!({ "color": color, "width": 2 }), serde_json::json!({ "size": 4, "color": color }), "lines")
    }
}

fn group_by_bank(rows: &[MetricRow]) -> Vec<(String, Vec<&MetricRow>)> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<&MetricRow>> = HashMap::new();
    for row in rows {
        groups.entry(row.banco.clone()).or_insert_with(|| {
            order.push(row.banco.clone());
            Vec::new()
        });
    }
    for row in rows {
        groups.get_mut(&row.banco).unwrap().push(row);
    }

    // INVEX first, SISTEMA second, remaining alphabetical.
    let mut ordered = Vec::new();
    if let Some(pos) = order.iter().position(|b| b.eq_ignore_ascii_case("INVEX")) {
        ordered.push(order.remove(pos));
    }
    if let Some(pos) = order.iter().position(|b| b.eq_ignore_ascii_case("SISTEMA")) {
        ordered.push(order.remove(pos));
    }
    order.sort();
    ordered.extend(order);

    ordered.into_iter().map(|b| (b.clone(), groups.remove(&b).unwrap_or_default())).collect()
}

fn evolution_layout(result: &AnalyticsResult) -> serde_json::Value {
    let grouped = group_by_bank(&result.rows);
    let mut traces = Vec::new();
    let mut annotations = Vec::new();

    for (banco, rows) in &grouped {
        let (line, marker, mode) = trace_style(banco);
        let xs: Vec<&str> = rows.iter().map(|r| r.fecha.as_str()).collect();
        let ys: Vec<f64> = rows.iter().map(|r| r.value).collect();
        traces.push(serde_json::json!({
            "x": xs, "y": ys, "type": "scatter", "mode": mode,
            "name": banco, "line": line, "marker": marker,
        }));

        let upper = banco.to_uppercase();
        if (upper == "INVEX" || upper == "SISTEMA") && !rows.is_empty() {
            let last = rows.last().unwrap();
            annotations.push(serde_json::json!({
                "x": last.fecha, "y": last.value, "xref": "x", "yref": "y",
                "text": format!("<b>{}</b><br>{:.2}", banco, last.value),
                "showarrow": true, "arrowcolor": line["color"],
            }));
        }
    }

    serde_json::json!({
        "data": traces,
        "layout": {
            "title": { "text": format!("Evolución de {}", metric_registry::registry().display(&result.metric_name).unwrap_or(&result.metric_name)) },
            "xaxis": { "title": "Fecha" },
            "yaxis": { "title": value_axis_title(result) },
            "annotations": annotations,
        }
    })
}

fn comparison_layout(result: &AnalyticsResult) -> serde_json::Value {
    evolution_layout(result)
}

fn ranking_layout(result: &AnalyticsResult) -> serde_json::Value {
    let entries: Vec<&RankingEntry> = result.ranking.iter().filter(|e| !e.banco.eq_ignore_ascii_case("SISTEMA")).collect();
    let avg: f64 = if entries.is_empty() { 0.0 } else { entries.iter().map(|e| e.promedio).sum::<f64>() / entries.len() as f64 };

    let colors: Vec<&str> = entries.iter().map(|e| bank_color(&e.banco)).collect();
    let x: Vec<f64> = entries.iter().map(|e| e.promedio).collect();
    let y: Vec<&str> = entries.iter().map(|e| e.banco.as_str()).collect();

    serde_json::json!({
        "data": [{
            "x": x, "y": y, "type": "bar", "orientation": "h",
            "marker": { "color": colors },
        }],
        "layout": {
            "title": { "text": format!("Ranking de {}", metric_registry::registry().display(&result.metric_name).unwrap_or(&result.metric_name)) },
            "xaxis": { "title": value_axis_title(result) },
            "shapes": [{
                "type": "line", "x0": avg, "x1": avg, "y0": 0, "y1": 1, "yref": "paper",
                "line": { "color": "#6B7280", "dash": "dot" },
            }],
            "annotations": [{ "text": format!("Promedio: {:.2}", avg), "x": avg, "y": 1.05, "yref": "paper", "showarrow": false }],
        }
    })
}

fn yoy_layout(result: &AnalyticsResult) -> serde_json::Value {
    let grouped = group_by_bank(&result.rows);
    let x: Vec<&str> = grouped.iter().map(|(b, _)| b.as_str()).collect();
    let y: Vec<f64> = grouped
        .iter()
        .map(|(_, rows)| {
            if rows.len() >= 2 {
                let last = rows.last().unwrap().value;
                let first = rows.first().unwrap().value;
                if first.abs() > f64::EPSILON { ((last - first) / first.abs()) * 100.0 } else { 0.0 }
            } else {
                0.0
            }
        })
        .collect();

    serde_json::json!({
        "data": [{ "x": x, "y": y, "type": "bar", "orientation": "h" }],
        "layout": { "title": { "text": format!("Variación interanual de {}", result.metric_name) } },
    })
}

fn variation_layout(result: &AnalyticsResult) -> serde_json::Value {
    let grouped = group_by_bank(&result.rows);
    let mut traces = Vec::new();
    for (banco, rows) in &grouped {
        let color = bank_color(banco);
        let xs: Vec<&str> = rows.iter().map(|r| r.fecha.as_str()).collect();
        let ys: Vec<f64> = rows.iter().map(|r| r.value).collect();
        let bar_colors: Vec<&str> = ys.iter().map(|v| if *v >= 0.0 { "#22C55E" } else { "#EF4444" }).collect();
        traces.push(serde_json::json!({
            "x": xs, "y": ys, "type": "bar", "name": banco,
            "marker": { "color": bar_colors, "line": { "color": color, "width": 1 } },
        }));
    }
    serde_json::json!({
        "data": traces,
        "layout": { "title": { "text": format!("Variación mensual de {}", result.metric_name) }, "barmode": "group" },
    })
}

/// Multi-metric distribution (e.g., IFRS9 stages) — one trace per group
/// (bank column doubles as the stage/segment label for these queries)
/// stacked into a single bar per date.
fn stacked_layout(result: &AnalyticsResult) -> serde_json::Value {
    let grouped = group_by_bank(&result.rows);
    let mut traces = Vec::new();
    for (label, rows) in &grouped {
        let color = bank_color(label);
        let xs: Vec<&str> = rows.iter().map(|r| r.fecha.as_str()).collect();
        let ys: Vec<f64> = rows.iter().map(|r| r.value).collect();
        traces.push(serde_json::json!({
            "x": xs, "y": ys, "type": "bar", "name": label,
            "marker": { "color": color },
        }));
    }
    serde_json::json!({
        "data": traces,
        "layout": {
            "title": { "text": format!("Distribución de {}", metric_registry::registry().display(&result.metric_name).unwrap_or(&result.metric_name)) },
            "xaxis": { "title": "Fecha" },
            "yaxis": { "title": value_axis_title(result) },
            "barmode": "stack",
        }
    })
}

fn single_series_layout(result: &AnalyticsResult) -> serde_json::Value {
    let rows = &result.rows;
    let xs: Vec<&str> = rows.iter().map(|r| r.fecha.as_str()).collect();
    let ys: Vec<f64> = rows.iter().map(|r| r.value).collect();
    serde_json::json!({
        "data": [{ "x": xs, "y": ys, "type": "scatter", "mode": "lines+markers", "line": { "color": SISTEMA_COLOR } }],
        "layout": { "title": { "text": result.metric_name.clone() } },
    })
}

fn table_layout(result: &AnalyticsResult) -> serde_json::Value {
    let header = vec!["fecha", "banco", "valor"];
    let fecha: Vec<&str> = result.rows.iter().map(|r| r.fecha.as_str()).collect();
    let banco: Vec<&str> = result.rows.iter().map(|r| r.banco.as_str()).collect();
    let valor: Vec<f64> = result.rows.iter().map(|r| r.value).collect();
    serde_json::json!({
        "data": [{
            "type": "table",
            "header": { "values": header },
            "cells": { "values": [fecha, banco, valor] },
        }],
        "layout": { "title": { "text": result.metric_name.clone() } },
    })
}

pub fn better_direction_color_class(direction: Option<BetterDirection>, delta: f64) -> &'static str {
    match direction {
        Some(BetterDirection::Lower) if delta < 0.0 => "green",
        Some(BetterDirection::Lower) => "red",
        Some(BetterDirection::Higher) if delta > 0.0 => "green",
        Some(BetterDirection::Higher) => "red",
        _ => "gray",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::analytics::{AnalyticsMetadata, TimeRangeWindow};

    fn data_result(rows: Vec<MetricRow>) -> AnalyticsResult {
        AnalyticsResult {
            result_type: AnalyticsResultType::Data,
            visualization: "evolution".into(),
            metric_name: "IMOR".into(),
            metric_type: "ratio".into(),
            bank_names: vec!["INVEX".into(), "SISTEMA".into()],
            time_range: TimeRangeWindow { start: None, end: None },
            data_as_of: "2026-07-28".into(),
            rows,
            ranking: vec![],
            summary_stats: None,
            plotly_config: serde_json::Value::Null,
            metadata: AnalyticsMetadata::default(),
            message: None,
        }
    }

    #[test]
    fn evolution_chart_puts_invex_first_with_dominant_line() {
        let rows = vec![
            MetricRow { fecha: "2026-01-01".into(), banco: "SISTEMA".into(), value: 4.0 },
            MetricRow { fecha: "2026-01-01".into(), banco: "INVEX".into(), value: 5.0 },
        ];
        let result = build_chart(data_result(rows));
        let traces = result.plotly_config["data"].as_array().unwrap();
        assert_eq!(traces[0]["name"], serde_json::json!("INVEX"));
        assert_eq!(traces[0]["line"]["width"], serde_json::json!(4));
    }

    #[test]
    fn passthrough_for_non_data_results() {
        let result = AnalyticsResult::empty("IMOR", "no data", "2026-07-28".into());
        let chart = build_chart(result);
        assert_eq!(chart.plotly_config, serde_json::Value::Null);
    }

    #[test]
    fn bank_color_falls_back_to_default_for_unknown_bank() {
        assert_eq!(bank_color("BANCO DESCONOCIDO"), DEFAULT_COLOR);
    }

    #[test]
    fn bank_color_is_deterministic_and_invex_is_brand_red() {
        assert_eq!(bank_color("invex"), INVEX_COLOR);
        assert_eq!(bank_color("invex"), bank_color("INVEX"));
    }

    #[test]
    fn stacked_chart_uses_stack_barmode() {
        let rows = vec![
            MetricRow { fecha: "2026-01-01".into(), banco: "Stage 1".into(), value: 80.0 },
            MetricRow { fecha: "2026-01-01".into(), banco: "Stage 2".into(), value: 15.0 },
        ];
        let mut result = data_result(rows);
        result.visualization = "stacked".into();
        let chart = build_chart(result);
        assert_eq!(chart.plotly_config["layout"]["barmode"], serde_json::json!("stack"));
        assert_eq!(chart.plotly_config["data"].as_array().unwrap().len(), 2);
    }
}
