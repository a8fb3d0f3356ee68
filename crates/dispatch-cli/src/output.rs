use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Placeholder for empty optional cells.
pub fn cell(value: Option<&str>) -> String {
    value.unwrap_or("-").to_string()
}

fn column_widths(headers: &[&str], rows: &[Vec<String>]) -> Vec<usize> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (w, c) in widths.iter_mut().zip(row) {
            *w = (*w).max(c.len());
        }
    }
    widths
}

fn render_row(cells: &[String], widths: &[usize]) -> String {
    cells
        .iter()
        .zip(widths)
        .map(|(c, w)| format!("{c:w$}"))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    if rows.is_empty() {
        println!("(none)");
        return;
    }
    let widths = column_widths(headers, &rows);
    let header: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    println!("{}", render_row(&header, &widths));
    let sep: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", render_row(&sep, &widths));
    for row in &rows {
        println!("{}", render_row(row, &widths));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_fit_longest_cell() {
        let rows = vec![vec!["T1".to_string(), "delivering".to_string()]];
        assert_eq!(column_widths(&["ID", "STATUS"], &rows), vec![2, 10]);
    }

    #[test]
    fn rows_are_padded_and_trimmed() {
        let line = render_row(&["a".into(), "b".into()], &[3, 3]);
        assert_eq!(line, "a    b");
    }

    #[test]
    fn empty_cells_render_as_dash() {
        assert_eq!(cell(None), "-");
        assert_eq!(cell(Some("W1")), "W1");
    }
}
