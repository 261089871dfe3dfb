use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Field(String),
    Index(usize),
}

/// Location of a value inside a document, printed as `tools[0].tool_spec.type`.
/// The document root prints as `$`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPath(Vec<Segment>);

impl FieldPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push_field(&mut self, name: &str) {
        self.0.push(Segment::Field(name.to_string()));
    }

    pub fn push_index(&mut self, idx: usize) {
        self.0.push(Segment::Index(idx));
    }

    pub fn pop(&mut self) {
        self.0.pop();
    }

    /// Builder form of `push_field`.
    pub fn field(mut self, name: &str) -> Self {
        self.push_field(name);
        self
    }

    /// Builder form of `push_index`.
    pub fn index(mut self, idx: usize) -> Self {
        self.push_index(idx);
        self
    }

    /// This path re-rooted below `prefix`.
    pub fn under(self, prefix: &FieldPath) -> Self {
        let mut segments = prefix.0.clone();
        segments.extend(self.0);
        Self(segments)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str("$");
        }
        for (i, seg) in self.0.iter().enumerate() {
            match seg {
                Segment::Field(name) if i == 0 => f.write_str(name)?,
                Segment::Field(name) => write!(f, ".{name}")?,
                Segment::Index(idx) => write!(f, "[{idx}]")?,
            }
        }
        Ok(())
    }
}
