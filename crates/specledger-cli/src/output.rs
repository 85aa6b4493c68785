use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

/// Render rows under a header and a dashed rule. Widths count characters,
/// so titles with multi-byte text stay aligned.
pub fn format_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    let pad = |cells: Vec<String>| -> String {
        cells
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let w = widths.get(i).copied().unwrap_or(0);
                let fill = w.saturating_sub(c.chars().count());
                format!("{c}{}", " ".repeat(fill))
            })
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = pad(headers.iter().map(|h| h.to_string()).collect());
    out.push('\n');
    out.push_str(&pad(widths.iter().map(|&w| "-".repeat(w)).collect()));
    out.push('\n');
    for row in rows {
        out.push_str(&pad(row.clone()));
        out.push('\n');
    }
    out
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    print!("{}", format_table(headers, &rows));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_align_on_character_width() {
        let rows = vec![
            vec!["SL-a1b2c3".to_string(), "café menu".to_string()],
            vec!["SL-ffffff".to_string(), "x".to_string()],
        ];
        let out = format_table(&["ID", "TITLE"], &rows);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "ID         TITLE");
        assert_eq!(lines[1], "---------  ---------");
        assert_eq!(lines[2], "SL-a1b2c3  café menu");
        assert_eq!(lines[3], "SL-ffffff  x");
    }
}
