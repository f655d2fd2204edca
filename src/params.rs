//! Path parameters captured by a route match.

/// Named values captured from `:name` and `*name` pattern segments.
///
/// Names are unique; inserting an existing name replaces its value. The
/// backing storage is kept when the context is recycled, so clearing and
/// refilling does not allocate once the buffer has grown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    entries: Vec<(String, String)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of the parameter called `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn insert(&mut self, name: &str, value: &str) {
        match self.entries.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => {
                v.clear();
                v.push_str(value);
            }
            None => self.entries.push((name.to_owned(), value.to_owned())),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parameters in pattern order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_replaces_existing_name() {
        let mut params = Params::new();
        params.insert("id", "1");
        params.insert("id", "2");
        assert_eq!(params.len(), 1);
        assert_eq!(params.get("id"), Some("2"));
    }

    #[test]
    fn iter_keeps_pattern_order() {
        let mut params = Params::new();
        params.insert("org", "acme");
        params.insert("repo", "anvil");
        let names: Vec<_> = params.iter().map(|(k, _)| k).collect();
        assert_eq!(names, ["org", "repo"]);
    }

    #[test]
    fn clear_empties() {
        let mut params = Params::new();
        params.insert("id", "1");
        params.clear();
        assert!(params.is_empty());
        assert_eq!(params.get("id"), None);
    }
}
