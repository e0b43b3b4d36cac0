//! Power-over-time line charts using plotters.
//!
//! The x axis is days since the first plotted point; labels are rendered
//! back as dates. Styling comes from [`ChartConfig`].

use super::config::ChartConfig;
use crate::roster::report::with_thousands;
use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use plotters::prelude::*;
use std::path::Path;

/// One line on a chart.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PowerSeries {
    pub label: String,
    /// Oldest first
    pub points: Vec<(NaiveDate, u64)>,
}

/// First plotted day and the number of days covered (at least 1).
fn day_span(series: &[PowerSeries]) -> Option<(NaiveDate, i64)> {
    let days = series.iter().flat_map(|s| s.points.iter().map(|(d, _)| *d));
    let (first, last) = days.fold(None, |acc: Option<(NaiveDate, NaiveDate)>, day| match acc {
        None => Some((day, day)),
        Some((lo, hi)) => Some((lo.min(day), hi.max(day))),
    })?;
    Some((first, (last - first).num_days().max(1)))
}

/// Power axis range with 5% padding on both sides.
fn power_range(series: &[PowerSeries]) -> (f64, f64) {
    let powers = series.iter().flat_map(|s| s.points.iter().map(|(_, p)| *p as f64));
    let (min, max) = powers.fold((f64::MAX, f64::MIN), |(lo, hi), p| (lo.min(p), hi.max(p)));
    if min > max {
        return (0.0, 1.0);
    }
    let pad = ((max - min) * 0.05).max(1.0);
    ((min - pad).max(0.0), max + pad)
}

fn rgb(c: [u8; 3]) -> RGBColor {
    RGBColor(c[0], c[1], c[2])
}

/// Renders `series` to a PNG at `output_path`.
///
/// A legend is drawn when there is more than one series.
pub fn draw_power_chart(
    title: &str,
    series: &[PowerSeries],
    output_path: &Path,
    config: &ChartConfig,
) -> Result<()> {
    let (first_day, span) = day_span(series).context("Nothing to plot")?;
    let (y_min, y_max) = power_range(series);
    let text_color = rgb(config.colors.text);
    let grid_color = rgb(config.colors.grid);
    let with_legend = series.len() > 1;

    let root = BitMapBackend::new(
        output_path,
        (config.layout.chart_width, config.layout.chart_height),
    )
    .into_drawing_area();
    root.fill(&rgb(config.colors.background))
        .context("Failed to fill chart background")?;

    let (plot_area, legend_area) = if with_legend {
        root.split_horizontally(config.layout.chart_width.saturating_sub(config.layout.legend_width))
    } else {
        root.split_horizontally(config.layout.chart_width)
    };

    let mut chart = ChartBuilder::on(&plot_area)
        .caption(title, ("sans-serif", config.font.title_size).into_font().color(&text_color))
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(90)
        .build_cartesian_2d(0i64..span, y_min..y_max)
        .context("Failed to build chart")?;

    let axis_font = ("sans-serif", config.font.axis_label_size)
        .into_font()
        .color(&text_color);
    chart
        .configure_mesh()
        .x_desc("Date")
        .y_desc("Power")
        .x_labels(span.min(10) as usize + 1)
        .x_label_formatter(&|offset| (first_day + Duration::days(*offset)).format("%m-%d").to_string())
        .y_label_formatter(&|power| with_thousands(power.max(0.0) as u64))
        .label_style(axis_font.clone())
        .axis_desc_style(axis_font)
        .axis_style(text_color)
        .light_line_style(grid_color.mix(0.5))
        .bold_line_style(grid_color)
        .draw()
        .context("Failed to draw mesh")?;

    for (idx, line) in series.iter().enumerate() {
        let color = if with_legend {
            Palette99::pick(idx).to_rgba()
        } else {
            rgb(config.colors.line).to_rgba()
        };
        let style = color.stroke_width(config.layout.line_width);
        let points = line
            .points
            .iter()
            .map(|(day, power)| ((*day - first_day).num_days(), *power as f64));
        chart.draw_series(LineSeries::new(points, style))?;

        if with_legend {
            let y = 20 + idx as i32 * (config.font.legend_size as i32 + 6);
            legend_area.draw(&Rectangle::new([(5, y), (25, y + 4)], color.filled()))?;
            legend_area.draw_text(
                &line.label,
                &("sans-serif", config.font.legend_size)
                    .into_font()
                    .color(&text_color),
                (30, y - config.font.legend_size as i32 / 2),
            )?;
        }
    }

    root.present().context("Failed to save chart")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_day_span_covers_all_series() {
        let series = vec![
            PowerSeries { label: "a".into(), points: vec![(day(5), 10), (day(9), 12)] },
            PowerSeries { label: "b".into(), points: vec![(day(2), 7)] },
        ];
        assert_eq!(day_span(&series), Some((day(2), 7)));
    }

    #[test]
    fn test_day_span_single_day_is_one() {
        let series = vec![PowerSeries { label: "a".into(), points: vec![(day(5), 10)] }];
        assert_eq!(day_span(&series), Some((day(5), 1)));
        assert_eq!(day_span(&[]), None);
    }

    #[test]
    fn test_power_range_padding() {
        let series = vec![PowerSeries {
            label: "a".into(),
            points: vec![(day(1), 1000), (day(2), 3000)],
        }];
        assert_eq!(power_range(&series), (900.0, 3100.0));
        assert_eq!(power_range(&[]), (0.0, 1.0));
    }
}
