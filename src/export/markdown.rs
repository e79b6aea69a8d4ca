use crate::awp_config::Author;
use crate::chapter::Chapter;

/// One approved chapter with its text.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub chapter: Chapter,
    pub body: String,
}

/// The assembled paper: metadata plus approved chapters in stage order.
///
/// Skipped chapters are simply absent.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub title: String,
    pub authors: Vec<Author>,
    /// Template name, selects the LaTeX document class
    pub template: String,
    pub sections: Vec<Section>,
}

impl Document {
    pub fn new(
        title: impl Into<String>,
        authors: Vec<Author>,
        template: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            authors,
            template: template.into(),
            sections: Vec::new(),
        }
    }

    pub fn push(&mut self, chapter: Chapter, body: impl Into<String>) {
        self.sections.push(Section {
            chapter,
            body: body.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// `Name (Affiliation), Name` as shown under the title.
    pub fn author_line(&self) -> String {
        self.authors
            .iter()
            .map(|a| match &a.affiliation {
                Some(aff) => format!("{} ({})", a.name, aff),
                None => a.name.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Render the whole document as markdown.
    pub fn to_markdown(&self) -> String {
        let mut lines: Vec<String> = Vec::new();

        lines.push(format!("# {}", self.title));
        lines.push(String::new());

        if !self.authors.is_empty() {
            lines.push(self.author_line());
            lines.push(String::new());
        }

        lines.push("## Table of Contents".to_string());
        lines.push(String::new());
        for section in &self.sections {
            lines.push(format!(
                "- [{}. {}](#{})",
                section.chapter.id,
                section.chapter.name,
                section.chapter.anchor()
            ));
        }
        lines.push(String::new());
        lines.push("---".to_string());
        lines.push(String::new());

        for section in &self.sections {
            lines.push(format!("## {}. {}", section.chapter.id, section.chapter.name));
            lines.push(String::new());
            lines.push(section.body.trim_end().to_string());
            lines.push(String::new());
            lines.push("---".to_string());
            lines.push(String::new());
        }

        lines.join("\n")
    }
}
