// Plain-text match log rendered as a minimal PDF document.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::archive::MatchLogEntry;

const PAGE_WIDTH: u32 = 612;
const PAGE_HEIGHT: u32 = 792;
const MARGIN: u32 = 50;
const LEADING: u32 = 14;
const FONT_SIZE: u32 = 10;
const MAX_CHARS_PER_LINE: usize = 90;
const LINES_PER_PAGE: usize = ((PAGE_HEIGHT - 2 * MARGIN) / LEADING) as usize;

/// The text body of a log document.
pub fn log_body(entry: &MatchLogEntry) -> String {
    let range = entry.timestamp_range;
    let mut lines = vec![
        "Kumite match log".to_string(),
        String::new(),
        format!("Division: {}", entry.division),
        format!("Referee: {}", entry.referee_name),
        format!("Started: {}", range.start.format("%Y-%m-%d %H:%M:%S UTC")),
        format!("Ended: {}", range.end.format("%Y-%m-%d %H:%M:%S UTC")),
        format!("Winner: {}", entry.winner),
        format!("Loser: {}", entry.loser),
        format!("Reason: {}", entry.reason.as_str()),
        format!(
            "Final score: AO {} - AKA {}",
            entry.final_score.ao, entry.final_score.aka
        ),
        String::new(),
        "Events:".to_string(),
    ];
    lines.extend(entry.event_lines.iter().cloned());
    lines.join("\n")
}

/// Render text as a PDF 1.4 document: Letter pages, Helvetica, one text
/// line per source line, hard-cut at 90 characters.
pub fn render_pdf(text: &str) -> std::io::Result<Vec<u8>> {
    let lines = wrap_lines(text);
    let pages: Vec<&[String]> = if lines.is_empty() {
        vec![&lines[..]]
    } else {
        lines.chunks(LINES_PER_PAGE).collect()
    };

    // Objects: 1 catalog, 2 page tree, 3 font, then a page + content pair per page.
    let page_ids: Vec<usize> = (0..pages.len()).map(|i| 4 + 2 * i).collect();
    let mut objects: Vec<Vec<u8>> = vec![
        b"<< /Type /Catalog /Pages 2 0 R >>".to_vec(),
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            page_ids
                .iter()
                .map(|id| format!("{id} 0 R"))
                .collect::<Vec<_>>()
                .join(" "),
            pages.len()
        )
        .into_bytes(),
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_vec(),
    ];

    for (page, &page_id) in pages.iter().zip(&page_ids) {
        objects.push(
            format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
                 /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
                page_id + 1
            )
            .into_bytes(),
        );
        let stream = compress(&page_content(page))?;
        let mut obj = format!(
            "<< /Length {} /Filter /FlateDecode >>\nstream\n",
            stream.len()
        )
        .into_bytes();
        obj.extend_from_slice(&stream);
        obj.extend_from_slice(b"\nendstream");
        objects.push(obj);
    }

    let mut out = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n", i + 1).as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"\nendobj\n");
    }

    let xref_at = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for offset in offsets {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_at}\n%%EOF\n",
            objects.len() + 1
        )
        .as_bytes(),
    );
    Ok(out)
}

/// Split into output lines, cutting anything longer than the line limit.
fn wrap_lines(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for line in text.lines() {
        let chars: Vec<char> = line.chars().collect();
        if chars.is_empty() {
            out.push(String::new());
            continue;
        }
        for chunk in chars.chunks(MAX_CHARS_PER_LINE) {
            out.push(chunk.iter().collect());
        }
    }
    out
}

fn page_content(lines: &[String]) -> Vec<u8> {
    let top = PAGE_HEIGHT - MARGIN;
    let mut content = format!("BT\n/F1 {FONT_SIZE} Tf\n{LEADING} TL\n{MARGIN} {top} Td\n");
    for line in lines {
        content.push_str(&format!("({}) Tj T*\n", escape(line)));
    }
    content.push_str("ET\n");
    content.into_bytes()
}

/// Escape a PDF string literal. Characters outside printable ASCII become `?`.
fn escape(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    for c in line.chars() {
        match c {
            '\\' | '(' | ')' => {
                out.push('\\');
                out.push(c);
            }
            ' '..='~' => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

fn compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}
