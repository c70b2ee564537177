//! Fixed-width text tables for chat output.
//!
//! Rendered inside a code block so the columns line up in the client.

/// Render `rows` under `headers` with every column padded to its widest cell.
pub fn render(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|header| header.len()).collect();
    for row in rows {
        for (index, cell) in row.iter().enumerate() {
            if index >= widths.len() {
                widths.push(cell.len());
            } else if cell.len() > widths[index] {
                widths[index] = cell.len();
            }
        }
    }

    let mut out = String::from("```\n");
    push_row(&mut out, headers.iter().map(|header| *header), &widths);
    push_separator(&mut out, &widths);
    for row in rows {
        push_row(&mut out, row.iter().map(|cell| cell.as_str()), &widths);
    }
    out.push_str("```");
    out
}

fn push_row<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>, widths: &[usize]) {
    let mut cells: Vec<&str> = cells.collect();
    cells.resize(widths.len(), "");
    for (cell, width) in cells.iter().zip(widths) {
        out.push_str(&format!("| {:<width$} ", cell, width = width));
    }
    out.push_str("|\n");
}

fn push_separator(out: &mut String, widths: &[usize]) {
    for width in widths {
        out.push_str(&format!("|{:-<width$}", "", width = width + 2));
    }
    out.push_str("|\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_pad_to_widest_cell() {
        let rendered = render(
            &["#", "item"],
            &[
                vec!["0".to_string(), "melk".to_string()],
                vec!["1".to_string(), "paaseieren".to_string()],
            ],
        );
        let expected = "```\n\
                        | # | item       |\n\
                        |---|------------|\n\
                        | 0 | melk       |\n\
                        | 1 | paaseieren |\n\
                        ```";
        assert_eq!(rendered, expected);
    }

    #[test]
    fn short_rows_get_empty_cells() {
        let rendered = render(
            &["received", "donated", "user"],
            &[vec!["3".to_string(), "1".to_string()]],
        );
        assert!(rendered.contains("| 3        | 1       |      |"));
    }
}
