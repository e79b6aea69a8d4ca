//! Markdown to LaTeX conversion.
//!
//! Covers the subset of markdown chapter drafts use: ATX headings, emphasis,
//! fenced and inline code, links, images and flat lists.

use regex::Regex;
use std::sync::LazyLock;

use super::markdown::Document;

static IMAGE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!\[(.*?)\]\((.+?)\)").unwrap());
static LINK_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[(.+?)\]\((.+?)\)").unwrap());
static CODE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`(.+?)`").unwrap());
static BOLD_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").unwrap());
static ITALIC_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*(.+?)\*").unwrap());
static ORDERED_ITEM_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+\. (.*)$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq)]
enum ListKind {
    Itemize,
    Enumerate,
}

impl ListKind {
    fn env(self) -> &'static str {
        match self {
            ListKind::Itemize => "itemize",
            ListKind::Enumerate => "enumerate",
        }
    }
}

/// LaTeX document class for a paper template.
pub fn document_class(template: &str) -> &'static str {
    match template {
        "ieee" => "IEEEtran",
        _ => "article",
    }
}

/// Escape characters that are special in LaTeX text. A character already
/// preceded by a backslash is left alone.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev = None;
    for c in text.chars() {
        if matches!(c, '&' | '%' | '_' | '#') && prev != Some('\\') {
            out.push('\\');
        }
        out.push(c);
        prev = Some(c);
    }
    out
}

fn convert_inline(text: &str) -> String {
    let text = escape_text(text);
    let text = IMAGE_REGEX.replace_all(
        &text,
        concat!(
            "\\begin{figure}[h]\n\\centering\n",
            "\\includegraphics[width=0.8\\textwidth]{$2}\n",
            "\\caption{$1}\n\\end{figure}",
        ),
    );
    let text = LINK_REGEX.replace_all(&text, "\\href{$2}{$1}");
    let text = CODE_REGEX.replace_all(&text, "\\texttt{$1}");
    let text = BOLD_REGEX.replace_all(&text, "\\textbf{$1}");
    let text = ITALIC_REGEX.replace_all(&text, "\\textit{$1}");
    text.into_owned()
}

fn heading(line: &str) -> Option<String> {
    let commands = [
        ("### ", "subsubsection"),
        ("## ", "subsection"),
        ("# ", "section"),
    ];
    commands.iter().find_map(|(prefix, cmd)| {
        line.strip_prefix(prefix)
            .map(|title| format!("\\{}{{{}}}", cmd, convert_inline(title.trim())))
    })
}

/// Convert a markdown body to LaTeX.
pub fn markdown_to_latex(markdown: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut list: Option<ListKind> = None;
    let mut in_code = false;

    for line in markdown.lines() {
        if in_code {
            if line.trim_start().starts_with("```") {
                out.push("\\end{lstlisting}".to_string());
                in_code = false;
            } else {
                out.push(line.to_string());
            }
            continue;
        }

        if let Some(lang) = line.trim_start().strip_prefix("```") {
            if let Some(kind) = list.take() {
                out.push(format!("\\end{{{}}}", kind.env()));
            }
            let lang = lang.trim();
            if lang.is_empty() {
                out.push("\\begin{lstlisting}".to_string());
            } else {
                out.push(format!("\\begin{{lstlisting}}[language={}]", lang));
            }
            in_code = true;
            continue;
        }

        let item = if let Some(rest) = line.strip_prefix("- ") {
            Some((ListKind::Itemize, rest))
        } else {
            ORDERED_ITEM_REGEX
                .captures(line)
                .and_then(|caps| caps.get(1))
                .map(|m| (ListKind::Enumerate, m.as_str()))
        };

        if let Some((kind, text)) = item {
            if list != Some(kind) {
                if let Some(open) = list {
                    out.push(format!("\\end{{{}}}", open.env()));
                }
                out.push(format!("\\begin{{{}}}", kind.env()));
                list = Some(kind);
            }
            out.push(format!("  \\item {}", convert_inline(text.trim())));
            continue;
        }

        // Blank lines inside a list are allowed; any other text closes it
        if let Some(open) = list
            && !line.trim().is_empty()
        {
            out.push(format!("\\end{{{}}}", open.env()));
            list = None;
        }

        match heading(line) {
            Some(h) => out.push(h),
            None => out.push(convert_inline(line)),
        }
    }

    if let Some(open) = list {
        out.push(format!("\\end{{{}}}", open.env()));
    }
    if in_code {
        out.push("\\end{lstlisting}".to_string());
    }

    out.join("\n")
}

/// Render a complete LaTeX document with preamble.
pub fn render_document(document: &Document) -> String {
    let authors = document
        .authors
        .iter()
        .map(|a| match &a.affiliation {
            Some(aff) => format!("{}\\\\{}", escape_text(&a.name), escape_text(aff)),
            None => escape_text(&a.name),
        })
        .collect::<Vec<_>>()
        .join(" \\and ");

    let body = document
        .sections
        .iter()
        .map(|s| {
            format!(
                "\\section{{{}}}\n{}\n",
                escape_text(&s.chapter.name),
                markdown_to_latex(&s.body)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let options = if document.template == "ieee" {
        "conference"
    } else {
        "a4paper,11pt"
    };

    format!(
        r"\documentclass[{options}]{{{class}}}

\usepackage[utf8]{{inputenc}}
\usepackage{{amsmath,amssymb}}
\usepackage{{graphicx}}
\usepackage{{hyperref}}
\usepackage{{listings}}
\usepackage{{xcolor}}

\lstset{{
    basicstyle=\ttfamily\small,
    breaklines=true,
    frame=single,
    numbers=left,
    numberstyle=\tiny,
}}

\title{{{title}}}
\author{{{authors}}}
\date{{\today}}

\begin{{document}}

\maketitle

{body}
\end{{document}}
",
        options = options,
        class = document_class(&document.template),
        title = escape_text(&document.title),
        authors = authors,
        body = body,
    )
}
