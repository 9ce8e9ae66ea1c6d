//! Markdown rendering for result tables.
//!
//! Produces a pipe table: header, alignment row, then one padded line per
//! row. Numeric columns are right-aligned.

use crate::result::{Cell, Table};

enum Align {
    Left,
    Right,
}

impl Table {
    /// Render as a pipe-style markdown table.
    pub fn to_markdown(&self) -> String {
        if self.columns.is_empty() {
            return String::new();
        }

        let header: Vec<String> = self.columns.iter().map(|c| escape(&c.name)).collect();
        let body: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| {
                (0..self.columns.len())
                    .map(|i| row.get(i).map(|c| escape(&c.to_string())).unwrap_or_default())
                    .collect()
            })
            .collect();

        let widths: Vec<usize> = (0..self.columns.len())
            .map(|i| {
                body.iter()
                    .map(|r| r[i].chars().count())
                    .chain(std::iter::once(header[i].chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let aligns: Vec<Align> = (0..self.columns.len())
            .map(|i| self.column_alignment(i))
            .collect();

        let mut out = String::new();
        push_line(&mut out, &header, &widths, &aligns);

        out.push('\n');
        out.push('|');
        for (width, align) in widths.iter().zip(&aligns) {
            let dashes = "-".repeat(width + 1);
            match align {
                Align::Left => out.push_str(&format!(":{dashes}|")),
                Align::Right => out.push_str(&format!("{dashes}:|")),
            }
        }

        for row in &body {
            out.push('\n');
            push_line(&mut out, row, &widths, &aligns);
        }
        out
    }

    // Right-align when every non-null cell is a number and at least one exists.
    fn column_alignment(&self, idx: usize) -> Align {
        let mut saw_number = false;
        for cell in self.rows.iter().filter_map(|r| r.get(idx)) {
            match cell {
                Cell::Null => {}
                c if c.is_numeric() => saw_number = true,
                _ => return Align::Left,
            }
        }
        if saw_number {
            Align::Right
        } else {
            Align::Left
        }
    }
}

fn push_line(out: &mut String, cells: &[String], widths: &[usize], aligns: &[Align]) {
    out.push('|');
    for ((cell, width), align) in cells.iter().zip(widths).zip(aligns) {
        let pad = width - cell.chars().count();
        match align {
            Align::Left => out.push_str(&format!(" {cell}{} |", " ".repeat(pad))),
            Align::Right => out.push_str(&format!(" {}{cell} |", " ".repeat(pad))),
        }
    }
}

fn escape(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}
