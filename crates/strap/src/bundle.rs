/// The artifact text under construction
///
/// Units are appended as the build discovers them. The open tag and header
/// line are prepended last, once the body is complete.
#[derive(Debug, Clone, Default)]
pub struct BundleBuffer {
    prefix: Vec<String>,
    body: String,
}

impl BundleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place `text` before everything added so far
    pub fn prepend(&mut self, text: impl Into<String>) -> &mut Self {
        self.prefix.push(text.into());
        self
    }

    pub fn append(&mut self, text: &str) -> &mut Self {
        self.body.push_str(text);
        self
    }

    /// Append `text`, starting it on a new line
    pub fn append_line(&mut self, text: &str) -> &mut Self {
        if !self.body.is_empty() && !self.body.ends_with('\n') {
            self.body.push('\n');
        }
        self.body.push_str(text);
        if !text.ends_with('\n') {
            self.body.push('\n');
        }
        self
    }

    pub fn into_string(self) -> String {
        let capacity = self.prefix.iter().map(String::len).sum::<usize>() + self.body.len();
        let mut out = String::with_capacity(capacity);
        for text in self.prefix.iter().rev() {
            out.push_str(text);
        }
        out.push_str(&self.body);
        out
    }
}
