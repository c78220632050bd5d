//! The tag tree consumed and produced by the textual codec.
//!
//! Reading and writing the XML-shaped text itself is the job of an external
//! tag reader/writer; this module only defines the tree those collaborators
//! exchange with the codec. A [`Tag`] carries a start name, attributes,
//! character content (plain text or CDATA) and child tags.

/// A named attribute on a tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attr {
    pub name: String,
    pub value: String,
}

/// One node of the tag tree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tag {
    pub start_name: String,
    pub attrs: Vec<Attr>,
    /// Plain character content.
    pub text: String,
    /// CDATA content. When present it takes precedence over `text`, even if
    /// empty.
    pub cdata: Option<String>,
    /// Hint for the external writer: render content inline.
    pub no_indent: bool,
    pub tags: Vec<Tag>,
}

impl Tag {
    pub fn new(start_name: impl Into<String>) -> Self {
        Self {
            start_name: start_name.into(),
            ..Self::default()
        }
    }

    /// Inline leaf tag with text content.
    pub fn with_text(start_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            start_name: start_name.into(),
            text: text.into(),
            no_indent: true,
            ..Self::default()
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push(Attr {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn with_child(mut self, child: Tag) -> Self {
        self.tags.push(child);
        self
    }

    /// Value of the first attribute with the given name.
    pub fn attr_value(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// First child tag with the given start name.
    pub fn child(&self, start_name: &str) -> Option<&Tag> {
        self.tags.iter().find(|t| t.start_name == start_name)
    }

    /// Character content: CDATA when present, text otherwise.
    pub fn content(&self) -> &str {
        match &self.cdata {
            Some(cdata) => cdata,
            None => &self.text,
        }
    }
}

/// A whole document: formatting preferences plus the root tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
    pub prefix: String,
    pub indent: String,
    pub suffix: String,
    pub root: Tag,
}

impl Document {
    /// A document with the standard root tag and formatting.
    pub fn new(root_tags: Vec<Tag>) -> Self {
        let mut root = Tag::new("roblox")
            .with_attr("xmlns:xmime", "http://www.w3.org/2005/05/xmlmime")
            .with_attr("version", "4");
        root.tags = root_tags;
        Self {
            prefix: String::new(),
            indent: "\t".to_string(),
            suffix: String::new(),
            root,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attr_lookup() {
        let tag = Tag::new("Item")
            .with_attr("class", "Part")
            .with_attr("referent", "RBX1");
        assert_eq!(tag.attr_value("class"), Some("Part"));
        assert_eq!(tag.attr_value("missing"), None);
    }

    #[test]
    fn test_content_prefers_cdata() {
        let mut tag = Tag::with_text("string", "plain");
        assert_eq!(tag.content(), "plain");
        tag.cdata = Some(String::new());
        assert_eq!(tag.content(), "");
    }
}
