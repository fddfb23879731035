//! Transaction extraction from bank-statement PDFs and receipt images (C2).
//!
//! `extract_transactions_from_pdf` runs a strategy chain and stops at the
//! first strategy producing at least one transaction (§4.3): an optional
//! cloud document-intelligence collaborator, then local table extraction,
//! then a whole-page per-line parser. The per-line parser, table-header
//! matcher, PhonePe pairing, and cross-strategy dedup are pure and
//! independent of the local PDF decoding shim, which is isolated in
//! `local_pdf` below.

use std::path::Path;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::clock::Clock;
use crate::error::{ArthaError, ArthaResult};
use crate::models::{Id, IdGenerator, Transaction, TransactionType};
use crate::money::Money;

pub const MAX_PDF_PAGES: usize = 5;

/// A row pulled out of a statement before it is turned into a `Transaction`
/// draft (category is assigned later by the categorizer, not here).
#[derive(Debug, Clone, PartialEq)]
struct ExtractedRow {
    date: NaiveDate,
    amount: Money,
    kind: TransactionType,
    description: String,
}

/// Uploads a document and polls for extracted text (§5: up to 60s / 30x2s).
/// `NotConfigured` by default; wiring a real vendor happens at the
/// composition root.
#[async_trait::async_trait]
pub trait DocumentIntelligence: Send + Sync {
    async fn extract_text(&self, pdf_bytes: &[u8]) -> ArthaResult<String>;
}

pub struct NoopDocumentIntelligence;

#[async_trait::async_trait]
impl DocumentIntelligence for NoopDocumentIntelligence {
    async fn extract_text(&self, _pdf_bytes: &[u8]) -> ArthaResult<String> {
        Err(ArthaError::not_configured("document intelligence"))
    }
}

/// `{merchant_name, date?, total_amount, currency, items[], category?,
/// payment_method?, raw_text}` (§4.3 receipt extractor).
#[derive(Debug, Clone)]
pub struct ReceiptData {
    pub merchant_name: String,
    pub date: Option<NaiveDate>,
    pub total_amount: Money,
    pub currency: String,
    pub items: Vec<String>,
    pub category: Option<String>,
    pub payment_method: Option<String>,
    pub raw_text: String,
}

/// Extracts a structured receipt from an image (§5: up to 30s).
#[async_trait::async_trait]
pub trait VisionOcr: Send + Sync {
    async fn extract_receipt(&self, image_bytes: &[u8]) -> ArthaResult<ReceiptData>;
}

pub struct NoopVisionOcr;

#[async_trait::async_trait]
impl VisionOcr for NoopVisionOcr {
    async fn extract_receipt(&self, _image_bytes: &[u8]) -> ArthaResult<ReceiptData> {
        Err(ArthaError::not_configured("vision OCR"))
    }
}

/// Entry point 1 of C2. Stops at the first strategy that yields >= 1 row:
/// cloud document intelligence (if configured), local table extraction,
/// then whole-page line-by-line parsing.
pub async fn extract_transactions_from_pdf(
    path: &Path,
    user_id: &Id,
    document_intelligence: Option<&dyn DocumentIntelligence>,
    ids: &dyn IdGenerator,
    clock: &dyn Clock,
) -> ArthaResult<Vec<Transaction>> {
    let pages = local_pdf::extract_page_texts(path)?;
    if pages.len() > MAX_PDF_PAGES {
        return Err(ArthaError::PageLimitExceeded { page_count: pages.len(), max_pages: MAX_PDF_PAGES });
    }

    let mut rows = Vec::new();

    if let Some(collaborator) = document_intelligence {
        let bytes = std::fs::read(path).map_err(|e| ArthaError::Validation(format!("failed to read PDF: {e}")))?;
        match collaborator.extract_text(&bytes).await {
            Ok(text) => rows = parse_whole_page(&[text]),
            Err(e) if e.is_retryable() => tracing::warn!(error = %e, "document intelligence unavailable, falling back"),
            Err(e) => return Err(e),
        }
    }

    if rows.is_empty() {
        rows = parse_tables(&pages);
    }

    if rows.is_empty() {
        rows = parse_whole_page(&pages);
    }

    let rows = dedup_rows(rows);

    Ok(rows
        .into_iter()
        .map(|row| {
            Transaction::draft(user_id.clone(), row.amount, row.kind, row.date, crate::categorizer::OTHER, row.description)
                .stamp(ids, clock)
        })
        .collect())
}

/// Entry point 2 of C2: delegates to a vision collaborator and normalizes
/// the result into a single expense transaction.
pub async fn extract_receipt_transaction(
    image_bytes: &[u8],
    user_id: &Id,
    vision: &dyn VisionOcr,
    ids: &dyn IdGenerator,
    clock: &dyn Clock,
) -> ArthaResult<Transaction> {
    let receipt = vision.extract_receipt(image_bytes).await?;

    let description = if receipt.items.is_empty() { receipt.merchant_name.clone() } else { receipt.items.join(", ") };

    let draft = Transaction::draft(
        user_id.clone(),
        receipt.total_amount,
        TransactionType::Expense,
        receipt.date.unwrap_or_else(|| clock.today()),
        receipt.category.clone().unwrap_or_else(|| crate::categorizer::OTHER.to_string()),
        description,
    )
    .with_merchant(receipt.merchant_name.clone())
    .stamp(ids, clock);

    let draft = match receipt.payment_method {
        Some(method) => draft.with_payment_method(method),
        None => draft,
    };

    Ok(draft)
}

/// Header keyword set used to locate the header row of a bank-statement
/// table (§4.3 step 2).
const HEADER_KEYWORDS: &[&[&str]] = &[
    &["date"],
    &["description", "particulars", "narration"],
    &["debit", "withdrawal"],
    &["credit", "deposit", "amount"],
];

/// Scans each page for a header row matching the keyword set, then parses
/// subsequent whitespace-delimited rows against the located columns.
fn parse_tables(pages: &[String]) -> Vec<ExtractedRow> {
    let mut rows = Vec::new();

    for page in pages {
        let lines: Vec<&str> = page.lines().collect();
        let mut header_cols: Option<Vec<&str>> = None;

        for line in lines {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                header_cols = None;
                continue;
            }

            let lower = trimmed.to_lowercase();
            let matched_groups = HEADER_KEYWORDS.iter().filter(|group| group.iter().any(|kw| lower.contains(kw))).count();
            if matched_groups >= 3 {
                header_cols = Some(split_columns(trimmed));
                continue;
            }

            if let Some(cols) = &header_cols {
                let data_cols = split_columns(trimmed);
                if data_cols.len() < 2 {
                    continue;
                }
                if let Some(row) = row_from_table_columns(cols, &data_cols) {
                    rows.push(row);
                }
            }
        }
    }

    rows
}

fn split_columns(line: &str) -> Vec<&str> {
    static SPLITTER: OnceLock<Regex> = OnceLock::new();
    let re = SPLITTER.get_or_init(|| Regex::new(r"\s{2,}|\t").expect("valid regex"));
    re.split(line).map(|s| s.trim()).filter(|s| !s.is_empty()).collect()
}

fn column_index(headers: &[&str], keywords: &[&str]) -> Option<usize> {
    headers.iter().position(|h| {
        let lower = h.to_lowercase();
        keywords.iter().any(|kw| lower.contains(kw))
    })
}

fn row_from_table_columns(headers: &[&str], data: &[&str]) -> Option<ExtractedRow> {
    let date_idx = column_index(headers, &["date"])?;
    let desc_idx = column_index(headers, &["description", "particulars", "narration"]);
    let debit_idx = column_index(headers, &["debit", "withdrawal"]);
    let credit_idx = column_index(headers, &["credit", "deposit"]);

    let date = parse_date_token(data.get(date_idx)?)?;
    let description = desc_idx.and_then(|i| data.get(i)).map(|s| s.to_string()).unwrap_or_default();

    let debit = debit_idx.and_then(|i| data.get(i)).and_then(|s| parse_amount_token(s));
    let credit = credit_idx.and_then(|i| data.get(i)).and_then(|s| parse_amount_token(s));

    let (amount, kind) = match (debit, credit) {
        (Some(d), _) if !d.is_zero() => (d, TransactionType::Expense),
        (_, Some(c)) if !c.is_zero() => (c, TransactionType::Income),
        _ => return None,
    };

    Some(ExtractedRow { date, amount, kind, description: collapse_whitespace(&description) })
}

/// Strategy 3: per non-empty line, attempt the generic parser, or the
/// PhonePe-specific parser when the document self-identifies as PhonePe.
fn parse_whole_page(pages: &[String]) -> Vec<ExtractedRow> {
    let is_phonepe = pages.iter().any(|p| p.to_lowercase().contains("phonepe"));

    let mut rows = Vec::new();
    for page in pages {
        if is_phonepe {
            rows.extend(parse_phonepe_lines(page));
        } else {
            for line in page.lines() {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                if let Some(row) = parse_line(trimmed) {
                    rows.push(row);
                }
            }
        }
    }
    rows
}

const INCOME_KEYWORDS: &[&str] = &["cr", "credit", "deposit", "received", "refund"];

/// Detects the first date token, all numeric amount tokens (first = amount,
/// last distinct one = balance), an income/expense keyword, and takes the
/// text between the date and first amount as the description (§4.3).
fn parse_line(line: &str) -> Option<ExtractedRow> {
    let (date, date_span) = find_date_token(line)?;
    let amounts: Vec<_> = find_amount_tokens(line).into_iter().filter(|(_, span)| !spans_overlap(*span, date_span)).collect();
    let (amount, amount_span) = amounts.first().cloned()?;

    let lower = line.to_lowercase();
    let kind = if INCOME_KEYWORDS.iter().any(|kw| lower.contains(kw)) { TransactionType::Income } else { TransactionType::Expense };

    let desc_start = date_span.1.min(amount_span.0);
    let desc_end = amount_span.0.max(date_span.1);
    let description = if desc_start < desc_end { collapse_whitespace(&line[desc_start..desc_end]) } else { String::new() };

    Some(ExtractedRow { date, amount, kind, description })
}

static PAID_TO: OnceLock<Regex> = OnceLock::new();
static RECEIVED_FROM: OnceLock<Regex> = OnceLock::new();

fn paid_to_pattern() -> &'static Regex {
    PAID_TO.get_or_init(|| Regex::new(r"(?i)paid to\s+([A-Za-z0-9 .&'/-]+?)(?:\s{2,}|$)").expect("valid regex"))
}

fn received_from_pattern() -> &'static Regex {
    RECEIVED_FROM.get_or_init(|| Regex::new(r"(?i)received from\s+([A-Za-z0-9 .&'/-]+?)(?:\s{2,}|$)").expect("valid regex"))
}

/// Pairs each `Paid to <merchant>` / `Received from <sender>` line with the
/// nearest amount: same line first, then the next non-empty line (§4.3,
/// §9 documents this pairing as fragile when a page has multiple
/// transactions close together).
fn parse_phonepe_lines(page: &str) -> Vec<ExtractedRow> {
    let lines: Vec<&str> = page.lines().collect();
    let mut rows = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        let (pattern, kind) = if paid_to_pattern().is_match(line) {
            (paid_to_pattern(), TransactionType::Expense)
        } else if received_from_pattern().is_match(line) {
            (received_from_pattern(), TransactionType::Income)
        } else {
            continue;
        };

        let Some(caps) = pattern.captures(line) else { continue };
        let who = caps.get(1).map(|m| m.as_str().trim().to_string()).unwrap_or_default();

        let nearest_amount = find_amount_tokens(line)
            .first()
            .map(|(amount, _)| *amount)
            .or_else(|| lines[i + 1..].iter().find_map(|later| find_amount_tokens(later).first().map(|(a, _)| *a)));

        let Some(amount) = nearest_amount else { continue };
        let date = find_date_token(line)
            .map(|(d, _)| d)
            .or_else(|| lines[i + 1..].iter().find_map(|l| find_date_token(l).map(|(d, _)| d)));
        let Some(date) = date else { continue };

        rows.push(ExtractedRow { date, amount, kind, description: who });
    }

    rows
}

fn date_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r"\b(\d{2})/(\d{2})/(\d{4})\b").expect("valid regex"),
            Regex::new(r"\b(\d{2})-(\d{2})-(\d{4})\b").expect("valid regex"),
            Regex::new(r"\b(\d{2})\s+([A-Za-z]{3})\s+(\d{4})\b").expect("valid regex"),
            Regex::new(r"\b(\d{2})/(\d{2})/(\d{2})\b").expect("valid regex"),
            Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("valid regex"),
            Regex::new(r"\b([A-Za-z]{3})\s+(\d{1,2}),\s+(\d{4})\b").expect("valid regex"),
        ]
    })
}

fn month_number(name: &str) -> Option<u32> {
    const MONTHS: &[&str] = &["jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec"];
    MONTHS.iter().position(|m| name.to_lowercase().starts_with(m)).map(|i| i as u32 + 1)
}

/// Returns the first matching date token and its byte span in `line`.
fn find_date_token(line: &str) -> Option<(NaiveDate, (usize, usize))> {
    let mut best: Option<(NaiveDate, (usize, usize))> = None;

    for (idx, pattern) in date_patterns().iter().enumerate() {
        if let Some(m) = pattern.find(line) {
            let caps = pattern.captures(line)?;
            let date = match idx {
                0 | 1 => NaiveDate::from_ymd_opt(
                    caps[3].parse().ok()?,
                    caps[2].parse().ok()?,
                    caps[1].parse().ok()?,
                ),
                2 => NaiveDate::from_ymd_opt(caps[3].parse().ok()?, month_number(&caps[2])?, caps[1].parse().ok()?),
                3 => {
                    let yy: i32 = caps[3].parse().ok()?;
                    let year = if yy < 70 { 2000 + yy } else { 1900 + yy };
                    NaiveDate::from_ymd_opt(year, caps[2].parse().ok()?, caps[1].parse().ok()?)
                }
                4 => NaiveDate::from_ymd_opt(caps[1].parse().ok()?, caps[2].parse().ok()?, caps[3].parse().ok()?),
                5 => NaiveDate::from_ymd_opt(caps[3].parse().ok()?, month_number(&caps[1])?, caps[2].parse().ok()?),
                _ => None,
            }?;

            match &best {
                Some((_, (start, _))) if *start <= m.start() => {}
                _ => best = Some((date, (m.start(), m.end()))),
            }
        }
    }

    best
}

/// The leading `\b` keeps this from matching digits embedded inside an
/// alphanumeric reference code (e.g. the `12345` in `ORDER12345`, where
/// there is no word boundary between the letter and the digit).
fn amount_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?:₹|Rs\.?\s*)?\b(\d{1,3}(?:,\d{2,3})*(?:\.\d{1,2})?)\s*(Cr|Dr)?").expect("valid regex"))
}

/// Whether two byte spans overlap, used to keep the date token's own digits
/// (e.g. `2026-03-07`) from being picked up as an amount token.
fn spans_overlap(a: (usize, usize), b: (usize, usize)) -> bool {
    a.0 < b.1 && b.0 < a.1
}

/// Extracts all numeric amount tokens, left to right, as `(amount, byte_span)`.
fn find_amount_tokens(line: &str) -> Vec<(Money, (usize, usize))> {
    let mut tokens = Vec::new();
    for caps in amount_pattern().captures_iter(line) {
        let Some(whole_match) = caps.get(0) else { continue };
        let Some(number) = caps.get(1) else { continue };
        let cleaned = number.as_str().replace(',', "");
        let Ok(decimal) = cleaned.parse::<rust_decimal::Decimal>() else { continue };
        if decimal.is_zero() && cleaned.len() <= 1 {
            continue;
        }
        tokens.push((Money::from_decimal(decimal), (whole_match.start(), whole_match.end())));
    }
    tokens
}

fn parse_date_token(text: &str) -> Option<NaiveDate> {
    find_date_token(text).map(|(d, _)| d)
}

fn parse_amount_token(text: &str) -> Option<Money> {
    find_amount_tokens(text).first().map(|(a, _)| *a)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Two rows are duplicates iff `|date_a - date_b| <= 1 day`, equal amount,
/// equal lowercased description, and equal type; the earliest date is kept
/// (§4.3 "Deduplication", P6).
fn dedup_rows(mut rows: Vec<ExtractedRow>) -> Vec<ExtractedRow> {
    rows.sort_by_key(|r| r.date);

    let mut kept: Vec<ExtractedRow> = Vec::new();
    'outer: for row in rows {
        for existing in kept.iter() {
            let day_gap = (row.date - existing.date).num_days().abs();
            if day_gap <= 1
                && row.amount == existing.amount
                && row.kind == existing.kind
                && row.description.to_lowercase() == existing.description.to_lowercase()
            {
                continue 'outer;
            }
        }
        kept.push(row);
    }
    kept
}

/// Isolates the local (non-collaborator) PDF page/text decoding behind a
/// narrow surface so the parsing logic above never depends on it directly.
mod local_pdf {
    use std::path::Path;

    use crate::error::{ArthaError, ArthaResult};

    /// Best-effort text extraction: walks each page's content stream and
    /// concatenates text-draw operands. Fonts without a usable encoding may
    /// yield garbled or empty text for a page; callers tolerate that by
    /// falling through to the next strategy.
    pub fn extract_page_texts(path: &Path) -> ArthaResult<Vec<String>> {
        let file = pdf::file::FileOptions::uncached()
            .open(path)
            .map_err(|e| ArthaError::Validation(format!("failed to open PDF: {e}")))?;

        let resolver = file.resolver();
        let mut pages = Vec::new();

        for page in file.pages() {
            let page = page.map_err(|e| ArthaError::Validation(format!("failed to read PDF page: {e}")))?;
            let mut text = String::new();

            if let Some(content) = page.contents.as_ref() {
                if let Ok(ops) = content.operations(&resolver) {
                    for op in ops {
                        append_op_text(&op, &mut text);
                    }
                }
            }

            pages.push(text);
        }

        Ok(pages)
    }

    fn append_op_text(op: &pdf::content::Op, out: &mut String) {
        match op {
            pdf::content::Op::TextDraw { text } => {
                out.push_str(&String::from_utf8_lossy(&text.data));
                out.push('\n');
            }
            pdf::content::Op::TextDrawAdjusted { array } => {
                for item in array {
                    if let pdf::content::TextDrawAdjusted::Text(t) = item {
                        out.push_str(&String::from_utf8_lossy(&t.data));
                    }
                }
                out.push('\n');
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_debit_line() {
        let line = "01/03/2026 UPI-ZOMATO*ORDER12345 500.00 Dr 10,000.00";
        let row = parse_line(line).expect("should parse");
        assert_eq!(row.date, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        assert_eq!(row.amount.to_string(), "500.00");
        assert_eq!(row.kind, TransactionType::Expense);
        assert_eq!(row.description, "UPI-ZOMATO*ORDER12345");
    }

    #[test]
    fn parses_credit_line_via_keyword() {
        let line = "05-03-2026 SALARY CREDIT 50000.00";
        let row = parse_line(line).expect("should parse");
        assert_eq!(row.kind, TransactionType::Income);
        assert_eq!(row.amount.to_string(), "50000.00");
    }

    #[test]
    fn iso_date_format_parses() {
        let line = "2026-03-07 AMAZON PURCHASE 1,250.50";
        let row = parse_line(line).expect("should parse");
        assert_eq!(row.date, NaiveDate::from_ymd_opt(2026, 3, 7).unwrap());
        assert_eq!(row.amount.to_string(), "1250.50");
    }

    #[test]
    fn phonepe_paid_to_pairs_with_nearest_amount() {
        let page = "Paid to Swiggy\n₹350\nReceived from Rahul\n₹2,000\n";
        let rows = parse_phonepe_lines(page);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].kind, TransactionType::Expense);
        assert_eq!(rows[0].description, "Swiggy");
        assert_eq!(rows[0].amount.to_string(), "350.00");
        assert_eq!(rows[1].kind, TransactionType::Income);
        assert_eq!(rows[1].amount.to_string(), "2000.00");
    }

    #[test]
    fn table_header_and_row_parse() {
        let page = "Date       Narration          Debit      Credit     Balance\n01/03/2026  ATM WITHDRAWAL     2000.00               48000.00\n";
        let rows = parse_tables(&[page.to_string()]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind, TransactionType::Expense);
        assert_eq!(rows[0].amount.to_string(), "2000.00");
    }

    #[test]
    fn dedup_merges_within_one_day_keeps_earliest() {
        let rows = vec![
            ExtractedRow { date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(), amount: Money::from_paise(50000), kind: TransactionType::Expense, description: "Zomato".into() },
            ExtractedRow { date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(), amount: Money::from_paise(50000), kind: TransactionType::Expense, description: "zomato".into() },
        ];
        let deduped = dedup_rows(rows);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].date, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
    }

    #[test]
    fn dedup_keeps_transactions_two_days_apart() {
        let rows = vec![
            ExtractedRow { date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(), amount: Money::from_paise(50000), kind: TransactionType::Expense, description: "Zomato".into() },
            ExtractedRow { date: NaiveDate::from_ymd_opt(2026, 3, 3).unwrap(), amount: Money::from_paise(50000), kind: TransactionType::Expense, description: "Zomato".into() },
        ];
        let deduped = dedup_rows(rows);
        assert_eq!(deduped.len(), 2);
    }
}

