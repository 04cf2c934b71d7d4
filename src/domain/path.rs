//! Control Paths
//!
//! A path is the ordered, root-first sequence of node names addressing one
//! control in the tree. On the wire it travels as the names joined with a
//! comma, so names themselves must not contain one.

/// Separator used for the wire encoding of a path.
pub const PATH_SEPARATOR: char = ',';

/// Address of one node in the control tree. Always non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ControlPath(Vec<String>);

impl ControlPath {
    /// Build a path from name segments. Returns `None` for an empty sequence.
    pub fn new<I, S>(segments: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            None
        } else {
            Some(Self(segments))
        }
    }

    /// Parse the wire form. Splitting always yields at least one segment,
    /// so this cannot fail.
    pub fn from_wire(joined: &str) -> Self {
        Self(joined.split(PATH_SEPARATOR).map(str::to_string).collect())
    }

    pub fn to_wire(&self) -> String {
        self.0.join(&PATH_SEPARATOR.to_string())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// The same path with `name` prepended as the new first segment.
    pub fn prefixed(&self, name: &str) -> Self {
        let mut segments = Vec::with_capacity(self.0.len() + 1);
        segments.push(name.to_string());
        segments.extend(self.0.iter().cloned());
        Self(segments)
    }

    /// The path without its first segment, or `None` if only one remains.
    pub fn without_first(&self) -> Option<Self> {
        if self.0.len() < 2 {
            None
        } else {
            Some(Self(self.0[1..].to_vec()))
        }
    }
}

impl std::fmt::Display for ControlPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_wire())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_round_trip() {
        let path = ControlPath::new(["Engines", "Warp", "Brightness"]).unwrap();
        assert_eq!(path.to_wire(), "Engines,Warp,Brightness");
        assert_eq!(ControlPath::from_wire(&path.to_wire()), path);
    }

    #[test]
    fn single_segment() {
        let path = ControlPath::from_wire("Power");
        assert_eq!(path.segments(), ["Power"]);
        assert!(path.without_first().is_none());
    }

    #[test]
    fn empty_sequence_rejected() {
        assert!(ControlPath::new(Vec::<String>::new()).is_none());
    }

    #[test]
    fn prefix_and_strip() {
        let wire = ControlPath::from_wire("Lights,Warp");
        let full = wire.prefixed("Enterprise");
        assert_eq!(full.segments(), ["Enterprise", "Lights", "Warp"]);
        assert_eq!(full.without_first().unwrap(), wire);
    }
}
