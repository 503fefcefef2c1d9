use near_diff_core::{Alignment, LineKind, LineRecord, NeighborResult, Score};

#[derive(Clone, Copy)]
enum Side {
    Left,
    Right,
}

/// Similarities print as percentages, distances as plain integers.
pub fn format_score(score: &Score) -> String {
    match *score {
        Score::Similarity(s) => format!("{:.1}%", s * 100.0),
        Score::Distance(d) => d.to_string(),
    }
}

pub fn render_neighbors(results: &[NeighborResult]) -> String {
    let mut out = String::new();
    for result in results {
        out.push_str(&format!("{:>8}  {}\n", format_score(&result.score), result.path));
    }
    out
}

fn marker(kind: LineKind) -> char {
    match kind {
        LineKind::Same | LineKind::Blank => ' ',
        LineKind::Changed => '~',
        LineKind::Removed => '-',
        LineKind::Added => '+',
    }
}

fn render_record(record: &LineRecord, side: Side) -> String {
    let Some(spans) = &record.spans else {
        return record.text.clone();
    };
    spans
        .iter()
        .map(|span| match (span.different, side) {
            (false, _) => span.text.clone(),
            (true, Side::Left) => format!("[-{}-]", span.text),
            (true, Side::Right) => format!("[+{}+]", span.text),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn fit(text: &str, width: usize) -> String {
    text.chars().take(width).collect()
}

/// Two-column text rendering of `alignment` with a summary footer.
pub fn render_side_by_side(
    left_name: &str,
    right_name: &str,
    alignment: &Alignment,
    width: usize,
) -> String {
    let columns = width + 2;
    let mut out = String::new();

    let header = format!("{:<columns$} | {}", fit(left_name, columns), right_name);
    out.push_str(header.trim_end());
    out.push('\n');

    for (l, r) in alignment.rows() {
        let line = format!(
            "{} {:<width$} | {} {}",
            marker(l.kind),
            fit(&render_record(l, Side::Left), width),
            marker(r.kind),
            render_record(r, Side::Right),
        );
        out.push_str(line.trim_end());
        out.push('\n');
    }

    let stats = alignment.stats();
    out.push_str(&format!(
        "{} same, {} changed, {} added, {} removed\n",
        stats.same, stats.changed, stats.added, stats.removed
    ));
    out
}
