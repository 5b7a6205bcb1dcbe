// src/ingest/mod.rs
//! Source fetchers and the text normalization they share.

pub mod parse;
pub mod providers;
pub mod types;

use scraper::node::Node;
use scraper::{Html, Selector};

pub use parse::{IndicatorParser, MonitorMessageParser, PageTextParser};
pub use types::IndicatorSource;

/// Visible text of an HTML document, roughly what a browser's
/// `body.textContent` gives: text nodes under `<body>` joined by single
/// spaces, skipping script, style and noscript subtrees.
pub fn page_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let body_selector = Selector::parse("body").expect("body selector");
    let Some(body) = document.select(&body_selector).next() else {
        return String::new();
    };

    let mut parts = Vec::new();
    for node in body.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|el| matches!(el.name(), "script" | "style" | "noscript"))
        });
        if hidden {
            continue;
        }
        // split_whitespace also folds NBSP
        parts.extend(text.split_whitespace());
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_text_strips_markup_and_scripts() {
        let html = r#"<html><head><style>.x{color:red}</style>
            <script>var participants = 1;</script></head>
            <body><div class="stat"><span>Participants</span><b>2,110,192</b></div>
            <!-- Liquidity 1 USDT --><p>Liquidity&nbsp;30,463,309&nbsp;USDT</p>
            <noscript>Liquidity 2 USDT</noscript><script>let l = 3;</script></body></html>"#;
        let text = page_text(html);
        assert_eq!(text, "Participants 2,110,192 Liquidity 30,463,309 USDT");
    }

    #[test]
    fn attribute_values_are_not_visible_text() {
        let html = r#"<body><a title="history > Liquidity 1,500,000 USDT">info</a>
            <p>Liquidity 30,463,309 USDT</p></body>"#;
        assert_eq!(page_text(html), "info Liquidity 30,463,309 USDT");
    }

    #[test]
    fn page_text_of_plain_text_is_trimmed() {
        assert_eq!(page_text("  a \n\t b  "), "a b");
        assert_eq!(page_text(""), "");
    }
}
