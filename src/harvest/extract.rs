//! Field and tool extraction from rendered catalog pages
//!
//! The catalog gives no stable markup to hang selectors on, so extraction
//! works over the rendered text: regexes for top-level server fields and a
//! line-oriented parser for the tools section. Two extraction variants
//! exist for tools; the structured one expands each tool element and reads
//! its parameter block, the degraded one parses the raw text and yields
//! tools with empty schemas.

use crate::model::{connection_url_for, server_slug, ServerRecord, ToolRecord};
use crate::render::RenderedPage;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::OnceLock;

fn homepage_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Homepage\s+(\S+\.\S+)").expect("static regex"))
}

fn source_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Source Code\s+(\S+)").expect("static regex"))
}

fn tool_count_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Tools\s*(\d+)").expect("static regex"))
}

fn page_indicator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)\s*/\s*(\d+)").expect("static regex"))
}

/// Section labels that terminate tool or parameter parsing
const SECTION_LABELS: &[&str] = &[
    "Connect",
    "Details",
    "Resources",
    "Company",
    "Capabilities",
    "Get connection URL",
    "Or add to your client",
];

/// Clickable labels that are page chrome, never tool names
const EXCLUDED_LABELS: &[&str] = &[
    "Developers",
    "Details",
    "Resources",
    "Company",
    "Capabilities",
    "Get connection URL",
    "Or add to your client",
    "Quality Score",
    "Monthly Tool Calls",
    "Uptime",
    "Local",
    "Published",
    "Connect",
    "View more",
    "Pricing",
    "Login",
    "Start for Free",
    "Tools",
    "Prompts",
];

const TYPE_KEYWORDS: &[&str] = &["string", "integer", "boolean", "object", "array", "number"];

/// Extracts a `current / total` page indicator from rendered text
pub fn page_indicator(text: &str) -> Option<(u32, u32)> {
    let captures = page_indicator_re().captures(text)?;
    let current = captures.get(1)?.as_str().parse().ok()?;
    let total = captures.get(2)?.as_str().parse().ok()?;
    Some((current, total))
}

/// Extracts the unique detail-page URLs referenced by a listing page
///
/// Returns normalized URLs in sorted order; query parameters are stripped
/// so the same server linked with different filters collapses to one key.
pub fn extract_listing_refs(page: &RenderedPage, base_url: &str) -> Vec<String> {
    let mut urls = BTreeSet::new();

    for link in &page.links {
        let href = link.href.split('?').next().unwrap_or(&link.href);
        if !href.contains("/server/") || href.ends_with("/servers") {
            continue;
        }
        let normalized = crate::model::normalize_server_url(href, base_url);
        if !normalized.is_empty() {
            urls.insert(normalized);
        }
    }

    urls.into_iter().collect()
}

/// Extracts the top-level server fields from a rendered detail page
///
/// Produces a record with an empty tool list; tool extraction is a
/// separate, independently retried step. The advertised tool count is
/// recorded when the page exposes one.
pub fn extract_server_fields(page: &RenderedPage, server_url: &str) -> ServerRecord {
    let mut record = ServerRecord::new(server_url);

    record.server_name = page.heading.clone().unwrap_or_default();
    record.description = page.meta_description.clone().unwrap_or_default();
    record.connection_url = connection_url_for(server_slug(server_url));
    record.authentication_method = "OAuth".to_string();

    if let Some(captures) = homepage_re().captures(&page.text) {
        let mut homepage = captures[1].to_string();
        if !homepage.starts_with("http") {
            homepage = format!("https://{}", homepage);
        }
        record.homepage = homepage;
    }

    if let Some(captures) = source_code_re().captures(&page.text) {
        let mut source = captures[1].to_string();
        if !source.starts_with("http") {
            source = format!("https://github.com/{}", source);
        }
        record.source_code = source;
    }

    if let Some(captures) = tool_count_re().captures(&page.text) {
        record.total_tools = captures[1].parse().unwrap_or(0);
    }

    record
}

/// Python-style `isupper`: has cased characters and none are lowercase
fn is_upper(text: &str) -> bool {
    text.chars().any(char::is_alphabetic) && !text.chars().any(|c| c.is_lowercase())
}

/// Python-style `islower`: has cased characters and none are uppercase
fn is_lower(text: &str) -> bool {
    text.chars().any(char::is_alphabetic) && !text.chars().any(|c| c.is_uppercase())
}

fn is_alnum(text: &str) -> bool {
    !text.is_empty() && text.chars().all(char::is_alphanumeric)
}

fn is_digits(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_digit())
}

/// Heuristic test for whether a clickable label is a tool name
///
/// Accepts the naming shapes the catalog uses: ALL_CAPS_WITH_UNDERSCORES,
/// lowercase_with_underscores, names-with-hyphens, camelCase, short plain
/// lowercase names, and descriptive labels with a tool id in parentheses.
pub fn looks_like_tool_name(text: &str) -> bool {
    if EXCLUDED_LABELS.contains(&text) {
        return false;
    }
    if is_digits(text) {
        return false;
    }
    // Pagination indicators like "2 / 14"
    if text.contains('/') && text.split('/').all(|part| is_digits(part.trim())) {
        return false;
    }
    if text.len() <= 3 {
        return false;
    }

    // ALL_CAPS_WITH_UNDERSCORES
    if is_upper(text) && text.contains('_') && text.len() < 100 {
        return true;
    }
    // lowercase_with_underscores
    if is_lower(text) && text.contains('_') && text.len() < 100 {
        return true;
    }
    // names-with-hyphens
    if text.contains('-') && is_alnum(&text.replace(['-', '_'], "")) && text.len() < 100 {
        return true;
    }
    // camelCase
    if text.chars().next().is_some_and(char::is_lowercase)
        && text.chars().any(char::is_uppercase)
        && is_alnum(&text.replace('_', ""))
        && text.len() < 100
    {
        return true;
    }
    // short plain lowercase names like "fetch" or "search"
    if is_lower(text) && is_alnum(text) && text.len() >= 4 && text.len() < 100 {
        return true;
    }
    // Descriptive label with the tool id in the last parentheses,
    // e.g. "Add Sheet (GOOGLESHEETS_ADD_SHEET)"
    if text.len() < 200 {
        if let (Some(open), Some(close)) = (text.rfind('('), text.rfind(')')) {
            if open > 0 && close > open {
                let inner = text[open + 1..close].trim();
                if ((is_upper(inner) || is_lower(inner))
                    && (inner.contains('_') || inner.contains('-')))
                    || inner.contains('-')
                {
                    return true;
                }
            }
        }
    }

    false
}

/// Degraded tool extraction from raw rendered text
///
/// Used when no clickable tool elements exist or the renderer cannot
/// expand them. After the "Tools" section header, alternating runs of
/// lines are treated as tool names and descriptions until a section break.
/// Tools parsed this way carry an empty-properties schema.
pub fn parse_tools_from_text(text: &str) -> Vec<ToolRecord> {
    let mut tools = Vec::new();
    let lines: Vec<&str> = text.lines().map(str::trim).collect();

    let Some(start) = lines.iter().position(|line| *line == "Tools") else {
        return tools;
    };

    let mut i = start + 1;
    // Skip the tool count and pagination indicators that follow the header
    while i < lines.len() && (is_digits(lines[i]) || lines[i].contains('/')) {
        i += 1;
    }

    while i < lines.len() {
        let line = lines[i];
        if line.is_empty() {
            i += 1;
            continue;
        }
        if ["Connect", "Details", "Company", "Capabilities"].contains(&line) {
            break;
        }
        if ["Resources", "Prompts"].contains(&line) {
            i += 1;
            if i < lines.len() && is_digits(lines[i]) {
                i += 1;
            }
            continue;
        }

        let name = line;
        i += 1;
        let mut desc_lines = Vec::new();
        while i < lines.len() {
            let desc_line = lines[i];
            if desc_line.is_empty() {
                i += 1;
                continue;
            }
            if ["Connect", "Details", "Resources", "Company", "Capabilities", "Prompts"]
                .contains(&desc_line)
            {
                break;
            }
            if is_upper(desc_line) && desc_line.contains('_') {
                break;
            }
            // Looks like the next tool name: short, starts uppercase
            if desc_line.split_whitespace().count() <= 6
                && desc_line.chars().next().is_some_and(char::is_uppercase)
            {
                break;
            }
            desc_lines.push(desc_line);
            i += 1;
        }

        tools.push(ToolRecord::bare(name, desc_lines.join(" ")));
    }

    tools
}

/// Parses a parameter block that follows a "Parameters" header
///
/// The rendered format is `name*required / type keyword / description
/// lines` repeated until the next section. Returns JSON-schema properties
/// plus the list of required parameter names.
pub fn parse_parameters(lines: &[&str]) -> (Map<String, Value>, Vec<String>) {
    let mut properties = Map::new();
    let mut required = Vec::new();

    let mut current_param: Option<String> = None;
    let mut param_type: Option<String> = None;
    let mut param_desc: Vec<String> = Vec::new();

    let flush = |param: &Option<String>,
                 ptype: &Option<String>,
                 desc: &[String],
                 properties: &mut Map<String, Value>,
                 required: &mut Vec<String>| {
        if let (Some(param), Some(ptype)) = (param, ptype) {
            let clean = param.replace("*required", "").trim().to_string();
            properties.insert(
                clean.clone(),
                serde_json::json!({
                    "type": ptype,
                    "description": desc.join(" ").trim(),
                }),
            );
            if param.contains("*required") {
                required.push(clean);
            }
        }
    };

    for raw_line in lines {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        if SECTION_LABELS.contains(&line) {
            break;
        }
        // Next tool name means the parameter block is over
        if is_upper(line) && line.contains('_') && line.len() > 15 {
            break;
        }

        if TYPE_KEYWORDS.contains(&line) {
            if current_param.is_some() && param_type.is_none() {
                param_type = Some(line.to_string());
            }
            continue;
        }

        let word_count = line.split_whitespace().count();
        let looks_like_param = line.len() < 50
            && word_count <= 2
            && (line.chars().next().is_some_and(char::is_lowercase) || line.contains("*required"))
            && (line.contains("*required") || !line.contains(' '));

        if looks_like_param {
            flush(
                &current_param,
                &param_type,
                &param_desc,
                &mut properties,
                &mut required,
            );
            current_param = Some(line.to_string());
            param_type = None;
            param_desc.clear();
        } else if current_param.is_some() && param_type.is_some() {
            param_desc.push(line.to_string());
        }
    }

    flush(
        &current_param,
        &param_type,
        &param_desc,
        &mut properties,
        &mut required,
    );

    (properties, required)
}

/// Extracts one tool's full record from the page text after its element
/// has been expanded
pub fn extract_tool_from_expanded(text: &str, tool_name: &str) -> ToolRecord {
    let lines: Vec<&str> = text.lines().map(str::trim).collect();

    // Description: substantial lines between the tool name and the next
    // section, capped at three
    let mut desc_lines = Vec::new();
    let mut found_tool = false;
    for line in &lines {
        if !found_tool {
            if line.contains(tool_name) {
                found_tool = true;
            }
            continue;
        }
        if ["Parameters", "Connect", "Details"].contains(line) {
            break;
        }
        if line.len() > 30 {
            desc_lines.push(*line);
        }
        if desc_lines.len() >= 3 {
            break;
        }
    }

    let mut schema = serde_json::json!({
        "type": "object",
        "properties": {},
    });

    if let Some(params_at) = lines.iter().position(|line| *line == "Parameters") {
        let (properties, required) = parse_parameters(&lines[params_at + 1..]);
        schema["properties"] = Value::Object(properties);
        if !required.is_empty() {
            schema["required"] = serde_json::json!(required);
        }
    }

    ToolRecord {
        name: tool_name.to_string(),
        description: desc_lines.join(" "),
        input_schema: schema,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::Link;

    #[test]
    fn test_page_indicator() {
        assert_eq!(page_indicator("Page 2 / 48 of servers"), Some((2, 48)));
        assert_eq!(page_indicator("no indicator here"), None);
    }

    #[test]
    fn test_extract_listing_refs_dedups_and_sorts() {
        let page = RenderedPage {
            links: vec![
                Link {
                    href: "/server/zeta?utm=1".to_string(),
                    text: "Zeta".to_string(),
                },
                Link {
                    href: "/server/alpha".to_string(),
                    text: "Alpha".to_string(),
                },
                Link {
                    href: "/server/zeta".to_string(),
                    text: "Zeta again".to_string(),
                },
                Link {
                    href: "/servers".to_string(),
                    text: "All servers".to_string(),
                },
                Link {
                    href: "/pricing".to_string(),
                    text: "Pricing".to_string(),
                },
            ],
            ..Default::default()
        };

        let refs = extract_listing_refs(&page, "https://smithery.ai");
        assert_eq!(
            refs,
            vec![
                "https://smithery.ai/server/alpha".to_string(),
                "https://smithery.ai/server/zeta".to_string(),
            ]
        );
    }

    #[test]
    fn test_extract_server_fields() {
        let page = RenderedPage {
            heading: Some("Example Server".to_string()),
            meta_description: Some("Does things".to_string()),
            text: "Details\nHomepage\nexample.com\nSource Code\nacme/example\nTools\n4\n"
                .to_string(),
            ..Default::default()
        };

        let record =
            extract_server_fields(&page, "https://smithery.ai/server/example");
        assert_eq!(record.server_name, "Example Server");
        assert_eq!(record.description, "Does things");
        assert_eq!(record.homepage, "https://example.com");
        assert_eq!(record.source_code, "https://github.com/acme/example");
        assert_eq!(
            record.connection_url,
            "https://server.smithery.ai/example/mcp"
        );
        assert_eq!(record.authentication_method, "OAuth");
        assert_eq!(record.total_tools, 4);
    }

    #[test]
    fn test_tool_name_patterns() {
        assert!(looks_like_tool_name("YOUTUBE_GET_VIDEO"));
        assert!(looks_like_tool_name("search_engine"));
        assert!(looks_like_tool_name("linkup-search"));
        assert!(looks_like_tool_name("searchSymbol"));
        assert!(looks_like_tool_name("fetch"));
        assert!(looks_like_tool_name("Add Sheet (GOOGLESHEETS_ADD_SHEET)"));
        assert!(looks_like_tool_name(
            "Delete Dimension (Rows/Columns) (GOOGLESHEETS_DELETE_DIMENSION)"
        ));
    }

    #[test]
    fn test_tool_name_rejections() {
        assert!(!looks_like_tool_name("Tools"));
        assert!(!looks_like_tool_name("Quality Score"));
        assert!(!looks_like_tool_name("42"));
        assert!(!looks_like_tool_name("2 / 14"));
        assert!(!looks_like_tool_name("abc"));
        assert!(!looks_like_tool_name("Some Long Marketing Sentence Here"));
    }

    #[test]
    fn test_parse_tools_from_text() {
        let text = "Example Server\nTools\n2\nsearch_engine\nSearches the web for matching documents and ranks them.\nfetch_page\nDownloads a page and extracts readable content.\nConnect\nGet connection URL";

        let tools = parse_tools_from_text(text);
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "search_engine");
        assert!(tools[0].description.starts_with("Searches the web"));
        assert_eq!(tools[1].name, "fetch_page");
        assert_eq!(tools[0].input_schema["type"], "object");
    }

    #[test]
    fn test_parse_tools_missing_section() {
        assert!(parse_tools_from_text("nothing useful here").is_empty());
    }

    #[test]
    fn test_parse_parameters() {
        let lines = vec![
            "query*required",
            "string",
            "The search query to run.",
            "limit",
            "integer",
            "Maximum results to return.",
            "Connect",
        ];

        let (properties, required) = parse_parameters(&lines);
        assert_eq!(properties.len(), 2);
        assert_eq!(properties["query"]["type"], "string");
        assert_eq!(
            properties["query"]["description"],
            "The search query to run."
        );
        assert_eq!(properties["limit"]["type"], "integer");
        assert_eq!(required, vec!["query".to_string()]);
    }

    #[test]
    fn test_parse_parameters_stops_at_next_tool() {
        let lines = vec![
            "query*required",
            "string",
            "The query.",
            "ANOTHER_LONG_TOOL_NAME_HERE",
            "ignored",
            "string",
        ];

        let (properties, _) = parse_parameters(&lines);
        assert_eq!(properties.len(), 1);
        assert!(properties.contains_key("query"));
    }

    #[test]
    fn test_extract_tool_from_expanded() {
        let text = "Tools\nsearch_engine\nSearches the web for documents matching a query string.\nParameters\nquery*required\nstring\nThe search query.\nConnect";

        let tool = extract_tool_from_expanded(text, "search_engine");
        assert_eq!(tool.name, "search_engine");
        assert!(tool.description.contains("Searches the web"));
        assert_eq!(tool.input_schema["properties"]["query"]["type"], "string");
        assert_eq!(tool.input_schema["required"][0], "query");
    }
}
