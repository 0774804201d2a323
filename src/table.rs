use std::fmt::Write as _;

/// Renders rows as left-aligned columns separated by two spaces, with a dashed
/// rule under the header.
pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count().max(3)).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let mut output = String::new();
    let _ = writeln!(output, "{}", format_line(headers, &widths));
    let _ = writeln!(output, "{}", format_line(&rule, &widths));
    for row in rows {
        let _ = writeln!(output, "{}", format_line(row, &widths));
    }
    output
}

pub fn print_table(headers: &[String], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

fn format_line(cells: &[String], widths: &[usize]) -> String {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| {
            let flattened = cell.replace(['\n', '\r', '\t'], " ");
            format!("{flattened:<width$}")
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}
