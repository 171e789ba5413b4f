//! レンダリング済みステータスページ（React/MUI）のHTML解析
//!
//! DOMは構築せず、MUIのクラス名を手がかりに正規表現で抽出する。
//! 上流のマークアップ変更に弱いため、抽出できなかった場合は呼び出し側で
//! render エラーとして扱う。

use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::types::{HealthStatus, Impact};

const COMPONENT_MARKER: &str = "MuiAccordionSummary-root";

/// アコーディオン1件として読む最大バイト数（最後の1件がページ末尾まで伸びないように）
const MAX_BLOCK_BYTES: usize = 2048;

/// コンポーネント名として扱わない文言
const SKIP_TEXTS: &[&str] = &[
    "status",
    "operational",
    "incident",
    "maintenance",
    "activity",
    "components",
    "services",
    "all systems",
    "past incidents",
    "about this site",
    "sign in",
];

const STATUS_SUFFIXES: &[&str] = &["operational", "degraded", "down", "maintenance", "outage"];
const RESOLVED_KEYWORDS: &[&str] = &[
    "resolved",
    "closed",
    "completed",
    "fixed",
    "ended",
    "postmortem",
    "archived",
];
const ACTIVE_KEYWORDS: &[&str] = &["investigating", "identified", "monitoring", "ongoing"];

/// 抽出したコンポーネント
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedComponent {
    /// 名前（ステータス接尾辞を除去済み）
    pub name: String,
    /// 稼働状態
    pub status: HealthStatus,
}

/// 抽出したアクティブなインシデント
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedIncident {
    /// 見出し
    pub title: String,
    /// 影響度
    pub impact: Impact,
    /// `<time datetime>` から得た開始時刻
    pub started_at: Option<DateTime<Utc>>,
}

/// 抽出したメンテナンス
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMaintenance {
    /// 見出し
    pub title: String,
    /// 開始予定
    pub scheduled_start: Option<DateTime<Utc>>,
    /// 終了予定
    pub scheduled_end: Option<DateTime<Utc>>,
}

/// ページ全体の解析結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPage {
    /// コンポーネント
    pub components: Vec<ParsedComponent>,
    /// アクティブなインシデント
    pub incidents: Vec<ParsedIncident>,
    /// 未完了のメンテナンス
    pub maintenances: Vec<ParsedMaintenance>,
}

struct Patterns {
    tag: Regex,
    whitespace: Regex,
    typography: Regex,
    heading: Regex,
    time: Regex,
    section: Regex,
    dates: Vec<Regex>,
    degraded: Regex,
    slug: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let re = |p: &str| Regex::new(p).expect("static regex");
        Patterns {
            tag: re(r"<[^>]*>"),
            whitespace: re(r"\s+"),
            typography: re(r#"(?s)<[a-z0-9]+\b[^>]*class="[^"]*MuiTypography[^"]*"[^>]*>([^<]+)<"#),
            heading: re(r"(?is)<(h[1-4]|strong|b)\b[^>]*>(.*?)</(?:h[1-4]|strong|b)>"),
            time: re(r#"(?i)<time\b[^>]*\bdatetime="([^"]+)""#),
            section: re(r#"(?i)<(?:div|article|section)\b[^>]*\bclass="([^"]*(?:incident|maintenance)[^"]*)""#),
            dates: vec![
                re(r"\d{1,2}[/-]\d{1,2}[/-]\d{2,4}"),
                re(r"(?i)(january|february|march|april|may|june|july|august|september|october|november|december)\s+\d{1,2}"),
                re(r"(?i)\d{1,2}(:\d{2})?\s*(am|pm)\b"),
            ],
            degraded: re(r"(?i)\b(degraded|degradation|partial|outage|down|offline|maintenance)\b"),
            slug: re(r"[^a-z0-9]+"),
        }
    })
}

/// 最小限のエンティティデコード
pub fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

/// タグを除去して空白を正規化したテキスト
pub fn text_content(html: &str) -> String {
    let p = patterns();
    let stripped = p.tag.replace_all(html, " ");
    let decoded = decode_entities(&stripped);
    p.whitespace.replace_all(decoded.trim(), " ").into_owned()
}

/// 見出しから安定したIDの元になるスラッグを作る
pub fn slugify(title: &str) -> String {
    let lowered = title.to_ascii_lowercase();
    patterns()
        .slug
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Split `html` at each occurrence of `marker`, starting each block at the
/// enclosing tag's `<`. Blocks are capped at [`MAX_BLOCK_BYTES`].
fn marker_blocks<'a>(html: &'a str, marker: &str) -> Vec<&'a str> {
    let starts: Vec<usize> = html
        .match_indices(marker)
        .map(|(idx, _)| html[..idx].rfind('<').unwrap_or(idx))
        .collect();
    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let next = starts.get(i + 1).copied().unwrap_or(html.len());
            let mut end = next.min(start + MAX_BLOCK_BYTES).max(start);
            while !html.is_char_boundary(end) {
                end -= 1;
            }
            &html[start..end]
        })
        .collect()
}

fn looks_like_component_name(name: &str) -> bool {
    let len = name.chars().count();
    if !(2..50).contains(&len) {
        return false;
    }
    let lowered = name.to_ascii_lowercase();
    if SKIP_TEXTS.contains(&lowered.as_str()) || name.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    !patterns().dates.iter().any(|re| re.is_match(name))
}

fn strip_status_suffix(name: &str) -> String {
    let lowered = name.to_ascii_lowercase();
    for suffix in STATUS_SUFFIXES {
        if lowered.ends_with(suffix) && lowered.len() > suffix.len() {
            // ASCII suffix, so the byte offset is a char boundary
            return name[..name.len() - suffix.len()].trim_end().to_string();
        }
    }
    name.to_string()
}

fn parse_components(html: &str) -> Vec<ParsedComponent> {
    let p = patterns();
    let mut seen = HashSet::new();
    let mut components = Vec::new();

    for block in marker_blocks(html, COMPONENT_MARKER) {
        if block.contains("MuiSkeleton-root")
            || block.contains("Mui-disabled")
            || block.contains(r#"aria-disabled="true""#)
        {
            continue;
        }
        let Some(raw_name) = p.typography.captures(block).and_then(|c| c.get(1)) else {
            continue;
        };
        let name = strip_status_suffix(&text_content(raw_name.as_str()));
        if !looks_like_component_name(&name) {
            continue;
        }

        let text = text_content(block);
        let rest = text.replacen(&name, " ", 1).to_ascii_lowercase();
        let status = if rest.contains("operational") {
            HealthStatus::Operational
        } else if p.degraded.is_match(&rest) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Operational
        };

        if seen.insert(name.clone()) {
            components.push(ParsedComponent { name, status });
        }
    }
    components
}

/// Section blocks whose class mentions incident or maintenance.
fn sections(html: &str) -> Vec<(String, &str)> {
    let matches: Vec<(usize, String)> = patterns()
        .section
        .captures_iter(html)
        .filter_map(|c| {
            let start = c.get(0)?.start();
            let class = c.get(1)?.as_str().to_ascii_lowercase();
            Some((start, class))
        })
        .collect();
    matches
        .iter()
        .enumerate()
        .map(|(i, (start, class))| {
            let end = matches.get(i + 1).map(|(s, _)| *s).unwrap_or(html.len());
            (class.clone(), &html[*start..end])
        })
        .collect()
}

fn heading(block: &str) -> Option<String> {
    patterns()
        .heading
        .captures(block)
        .and_then(|c| c.get(2))
        .map(|m| text_content(m.as_str()))
        .filter(|t| !t.is_empty())
}

fn times(block: &str) -> Vec<DateTime<Utc>> {
    patterns()
        .time
        .captures_iter(block)
        .filter_map(|c| c.get(1).and_then(|m| parse_datetime(m.as_str())))
        .collect()
}

fn impact_from(text: &str) -> Impact {
    if text.contains("critical") {
        Impact::Critical
    } else if text.contains("major") {
        Impact::Major
    } else {
        Impact::Minor
    }
}

/// レンダリング済みHTMLを解析する
pub fn parse_page(html: &str) -> ParsedPage {
    let mut page = ParsedPage {
        components: parse_components(html),
        ..ParsedPage::default()
    };

    for (class, block) in sections(html) {
        let text = text_content(block).to_ascii_lowercase();
        if contains_any(&text, RESOLVED_KEYWORDS) {
            continue;
        }
        if class.contains("maintenance") {
            let found = times(block);
            page.maintenances.push(ParsedMaintenance {
                title: heading(block).unwrap_or_else(|| "Maintenance".to_string()),
                scheduled_start: found.first().copied(),
                scheduled_end: found.get(1).copied(),
            });
        } else if contains_any(&text, ACTIVE_KEYWORDS) {
            page.incidents.push(ParsedIncident {
                title: heading(block).unwrap_or_else(|| "Incident".to_string()),
                impact: impact_from(&text),
                started_at: times(block).first().copied(),
            });
        }
    }
    page
}
