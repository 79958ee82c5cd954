//! Minimal SVG line plots.

/// One named polyline.
#[derive(Debug, Clone)]
pub struct Series {
    pub name: String,
    pub color: String,
    pub points: Vec<(f64, f64)>,
}

impl Series {
    pub fn new(name: &str, color: &str, points: Vec<(f64, f64)>) -> Self {
        Self {
            name: name.to_string(),
            color: color.to_string(),
            points,
        }
    }

    fn finite_points(&self) -> impl Iterator<Item = &(f64, f64)> + '_ {
        self.points
            .iter()
            .filter(|(x, y)| x.is_finite() && y.is_finite())
    }
}

/// Line chart with axes, bounds labels and a legend.
#[derive(Debug, Clone)]
pub struct LinePlot {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub width: f64,
    pub height: f64,
    pub series: Vec<Series>,
}

const MARGIN: f64 = 60.0;

impl LinePlot {
    pub fn new(title: &str, x_label: &str, y_label: &str) -> Self {
        Self {
            title: title.to_string(),
            x_label: x_label.to_string(),
            y_label: y_label.to_string(),
            width: 800.0,
            height: 500.0,
            series: Vec::new(),
        }
    }

    pub fn add_series(&mut self, series: Series) {
        self.series.push(series);
    }

    /// Data bounds over all finite points, widened when degenerate.
    fn bounds(&self) -> (f64, f64, f64, f64) {
        let mut x_min = f64::INFINITY;
        let mut x_max = f64::NEG_INFINITY;
        let mut y_min = f64::INFINITY;
        let mut y_max = f64::NEG_INFINITY;
        for (x, y) in self.series.iter().flat_map(|s| s.finite_points()) {
            x_min = x_min.min(*x);
            x_max = x_max.max(*x);
            y_min = y_min.min(*y);
            y_max = y_max.max(*y);
        }
        if !x_min.is_finite() {
            return (0.0, 1.0, 0.0, 1.0);
        }
        if x_max - x_min < f64::EPSILON {
            x_min -= 0.5;
            x_max += 0.5;
        }
        if y_max - y_min < f64::EPSILON {
            let pad = y_min.abs().max(1.0) * 0.1;
            y_min -= pad;
            y_max += pad;
        }
        (x_min, x_max, y_min, y_max)
    }

    pub fn to_svg(&self) -> String {
        let (x_min, x_max, y_min, y_max) = self.bounds();
        let plot_w = self.width - 2.0 * MARGIN;
        let plot_h = self.height - 2.0 * MARGIN;
        let sx = |x: f64| MARGIN + (x - x_min) / (x_max - x_min) * plot_w;
        let sy = |y: f64| self.height - MARGIN - (y - y_min) / (y_max - y_min) * plot_h;

        let mut svg = format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">\n\
  <rect x=\"0\" y=\"0\" width=\"{w}\" height=\"{h}\" fill=\"white\"/>\n\
  <text x=\"{cx}\" y=\"30\" font-size=\"16\" font-weight=\"bold\" text-anchor=\"middle\">{title}</text>\n\
  <line x1=\"{m}\" y1=\"{bottom}\" x2=\"{right}\" y2=\"{bottom}\" stroke=\"#333\"/>\n\
  <line x1=\"{m}\" y1=\"{m}\" x2=\"{m}\" y2=\"{bottom}\" stroke=\"#333\"/>\n\
  <text x=\"{cx}\" y=\"{xl}\" font-size=\"12\" text-anchor=\"middle\">{x_label}</text>\n\
  <text x=\"15\" y=\"{cy}\" font-size=\"12\" text-anchor=\"middle\" transform=\"rotate(-90 15 {cy})\">{y_label}</text>\n",
            w = self.width,
            h = self.height,
            cx = self.width / 2.0,
            cy = self.height / 2.0,
            m = MARGIN,
            bottom = self.height - MARGIN,
            right = self.width - MARGIN,
            xl = self.height - 15.0,
            title = escape(&self.title),
            x_label = escape(&self.x_label),
            y_label = escape(&self.y_label),
        );

        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{}\" font-size=\"10\" text-anchor=\"end\">{}</text>\n\
  <text x=\"{}\" y=\"{}\" font-size=\"10\" text-anchor=\"end\">{}</text>\n\
  <text x=\"{}\" y=\"{}\" font-size=\"10\">{}</text>\n\
  <text x=\"{}\" y=\"{}\" font-size=\"10\" text-anchor=\"end\">{}</text>\n",
            MARGIN - 5.0, self.height - MARGIN, tick(y_min),
            MARGIN - 5.0, MARGIN + 10.0, tick(y_max),
            MARGIN, self.height - MARGIN + 15.0, tick(x_min),
            self.width - MARGIN, self.height - MARGIN + 15.0, tick(x_max),
        ));

        for (i, series) in self.series.iter().enumerate() {
            let points: Vec<String> = series
                .finite_points()
                .map(|(x, y)| format!("{:.2},{:.2}", sx(*x), sy(*y)))
                .collect();
            if !points.is_empty() {
                svg.push_str(&format!(
                    "  <polyline fill=\"none\" stroke=\"{}\" stroke-width=\"2\" points=\"{}\"/>\n",
                    series.color,
                    points.join(" ")
                ));
            }
            let ly = MARGIN + 15.0 * i as f64;
            svg.push_str(&format!(
                "  <rect x=\"{}\" y=\"{}\" width=\"12\" height=\"4\" fill=\"{}\"/>\n\
  <text x=\"{}\" y=\"{}\" font-size=\"11\">{}</text>\n",
                self.width - MARGIN - 110.0, ly - 4.0, series.color,
                self.width - MARGIN - 94.0, ly, escape(&series.name),
            ));
        }

        svg.push_str("</svg>\n");
        svg
    }
}

fn tick(value: f64) -> String {
    if value.abs() >= 1e4 || (value != 0.0 && value.abs() < 1e-3) {
        format!("{:.3e}", value)
    } else {
        format!("{:.3}", value)
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plot_contains_series() {
        let mut plot = LinePlot::new("Convergence", "generation", "fitness");
        plot.add_series(Series::new("best", "#d62728", vec![(0.0, 1.0), (1.0, 3.0)]));
        plot.add_series(Series::new("mean", "#1f77b4", vec![(0.0, 0.5), (1.0, 2.0)]));
        let svg = plot.to_svg();
        assert!(svg.starts_with("<svg"));
        assert_eq!(svg.matches("<polyline").count(), 2);
        assert!(svg.contains("best"));
    }

    #[test]
    fn test_plot_skips_non_finite_and_handles_empty() {
        let mut plot = LinePlot::new("Residuals", "iteration", "rms[Rho] <log>");
        plot.add_series(Series::new("rho", "#000", vec![(0.0, f64::NAN)]));
        let svg = plot.to_svg();
        assert!(!svg.contains("<polyline"));
        assert!(svg.contains("&lt;log&gt;"));
    }
}
