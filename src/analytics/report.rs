//! Markdown analysis and insight reports.
//!
//! Epistemic foundation:
//! - K_i: Sections appear in a fixed order and are skipped when not applicable
//! - K_i: "Strong" means |r| > 0.7 in the analysis and |r| > 0.8 in insights
//! - I^R: Dataset shape decides which recommendations apply

use super::Dataset;
use super::stats::{
    correlated_pairs, duplicate_rows, iqr_outliers, max, mean, median, min, std_dev, value_counts,
};
use std::fmt::Write;

const ANALYSIS_CORRELATION: f64 = 0.7;
const INSIGHT_CORRELATION: f64 = 0.8;
const MAX_CATEGORICAL_COLUMNS: usize = 5;
const MAX_OUTLIER_COLUMNS: usize = 3;

/// Format an integer with comma thousands separators.
pub fn thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}

/// Full markdown analysis of a dataset.
pub fn comprehensive_analysis(data: &Dataset) -> String {
    let rows = data.n_rows();
    let columns = data.columns();
    let mut out = String::from("# 📊 Comprehensive Data Analysis\n\n");

    // writeln! on a String cannot fail
    let _ = writeln!(out, "## 📋 Dataset Overview");
    let _ = writeln!(
        out,
        "- **Shape**: {} rows × {} columns",
        thousands(rows),
        data.n_columns()
    );
    let _ = writeln!(
        out,
        "- **Memory**: {:.2} MB\n",
        data.approx_memory_bytes() as f64 / (1024.0 * 1024.0)
    );

    let _ = writeln!(out, "## 📈 Column Analysis");
    for (idx, name) in columns.iter().enumerate() {
        let nulls = data.null_count(idx);
        let _ = writeln!(
            out,
            "- **{name}**: {} ({} nulls, {:.1}%)",
            data.kind(idx).dtype(),
            thousands(nulls),
            percent(nulls, rows)
        );
    }
    out.push('\n');

    let numeric = data.numeric_columns();
    if !numeric.is_empty() {
        let _ = writeln!(out, "## 🔢 Numerical Statistics");
        for &idx in &numeric {
            let values = data.numbers(idx);
            let _ = writeln!(out, "### {}", columns[idx]);
            let _ = writeln!(out, "- Mean: {:.2}", mean(&values));
            let _ = writeln!(out, "- Median: {:.2}", median(&values));
            let _ = writeln!(out, "- Std Dev: {:.2}", std_dev(&values));
            let _ = writeln!(
                out,
                "- Range: {:.2} to {:.2}\n",
                min(&values),
                max(&values)
            );
        }
    }

    let categorical = data.text_columns();
    if !categorical.is_empty() {
        let _ = writeln!(out, "## 📝 Categorical Analysis");
        for &idx in categorical.iter().take(MAX_CATEGORICAL_COLUMNS) {
            let counts = value_counts(data, idx);
            let _ = writeln!(out, "### {}", columns[idx]);
            let _ = writeln!(out, "- Unique values: {}", thousands(counts.len()));
            let _ = writeln!(out, "- Most common:");
            for (value, count) in counts.iter().take(3) {
                let _ = writeln!(
                    out,
                    "  - {value}: {} ({:.1}%)",
                    thousands(*count),
                    percent(*count, rows)
                );
            }
            out.push('\n');
        }
    }

    if numeric.len() > 1 {
        let _ = writeln!(out, "## 🔗 Correlation Insights");
        let pairs = correlated_pairs(data, ANALYSIS_CORRELATION);
        if pairs.is_empty() {
            let _ = writeln!(out, "No strong correlations (>0.7) detected.");
        } else {
            let _ = writeln!(out, "**Strong correlations found:**");
            for (a, b, r) in pairs {
                let _ = writeln!(out, "- {} ↔ {}: {r:.3}", columns[a], columns[b]);
            }
        }
        out.push('\n');
    }

    let total_cells = data.total_cells();
    let total_nulls = data.total_nulls();
    let duplicates = duplicate_rows(data);
    let _ = writeln!(out, "## ✅ Data Quality Assessment");
    let _ = writeln!(
        out,
        "- **Completeness**: {:.1}%",
        percent(total_cells - total_nulls, total_cells)
    );
    let _ = writeln!(out, "- **Total missing values**: {}", thousands(total_nulls));
    let _ = writeln!(
        out,
        "- **Duplicate rows**: {} ({:.1}%)",
        thousands(duplicates),
        percent(duplicates, rows)
    );

    out
}

/// Short markdown insights and recommendations.
pub fn insights(data: &Dataset) -> String {
    let rows = data.n_rows();
    let columns = data.columns();
    let mut lines: Vec<String> = Vec::new();

    let null_pct = percent(data.total_nulls(), data.total_cells());
    if null_pct > 10.0 {
        lines.push(format!(
            "⚠️ **Data Quality Alert**: {null_pct:.1}% missing values"
        ));
    } else if null_pct > 0.0 {
        lines.push(format!("✅ **Good Quality**: {null_pct:.1}% missing values"));
    } else {
        lines.push("✅ **Excellent Quality**: No missing values!".to_string());
    }

    let numeric = data.numeric_columns();
    if numeric.len() >= 2 {
        let strong = correlated_pairs(data, INSIGHT_CORRELATION);
        if !strong.is_empty() {
            lines.push("🔗 **Strong Correlations Detected**:".to_string());
            for (a, b, r) in strong.into_iter().take(3) {
                let direction = if r > 0.0 { "positive" } else { "negative" };
                lines.push(format!(
                    "   - {} and {}: {direction} ({r:.3})",
                    columns[a], columns[b]
                ));
            }
        }
    }

    let outliers: Vec<(usize, usize)> = numeric
        .iter()
        .take(MAX_OUTLIER_COLUMNS)
        .map(|&idx| (idx, iqr_outliers(&data.numbers(idx))))
        .filter(|&(_, count)| count > 0)
        .collect();
    if !outliers.is_empty() {
        lines.push("📊 **Outlier Detection**:".to_string());
        for (idx, count) in outliers {
            lines.push(format!(
                "   - {}: {count} outliers ({:.1}%)",
                columns[idx],
                percent(count, rows)
            ));
        }
    }

    lines.push("\n### 💡 **Recommendations**:".to_string());
    if rows < 100 {
        lines.push("- Consider collecting more data".to_string());
    } else if rows > 10_000 {
        lines.push("- Large dataset - consider sampling".to_string());
    }
    if numeric.len() >= 3 {
        lines.push("- Try dimensionality reduction (PCA)".to_string());
    }
    let categorical = data.text_columns().len();
    if categorical > 0 {
        lines.push(format!(
            "- {categorical} categorical variables - consider encoding"
        ));
    }
    lines.push("- Use visualization tools to explore patterns".to_string());
    lines.push("- Try ML models if you have a target variable".to_string());

    lines.join("\n")
}
