//! JSON output format for process trees
//!
//! --format json: one compact object per tracee, children nested.

use crate::filter::ExcludeFilter;
use crate::tracee::Tracee;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::io::{self, Write};

/// A single tracee and its (non-excluded) descendants
#[derive(Debug, Serialize)]
pub struct JsonTracee<'a> {
    pub tid: i32,
    /// Working directory, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<&'a str>,
    /// Command line, if an exec was observed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<JsonEnvironment<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<JsonTracee<'a>>>,
}

impl<'a> JsonTracee<'a> {
    /// Build the JSON view of `tracee`, leaving out excluded children.
    pub fn new(tracee: &'a Tracee, exclude: &ExcludeFilter, include_environment: bool) -> Self {
        let children = (!tracee.children.is_empty()).then(|| {
            tracee
                .children
                .iter()
                .filter(|child| !exclude.excludes(child))
                .map(|child| JsonTracee::new(child, exclude, include_environment))
                .collect()
        });

        Self {
            tid: tracee.tid.as_raw(),
            directory: tracee.working_directory.as_deref(),
            arguments: tracee.arguments.as_deref(),
            environment: tracee
                .environment
                .as_deref()
                .filter(|_| include_environment)
                .map(JsonEnvironment),
            children,
        }
    }
}

/// `KEY=VALUE` entries serialized as an object in their original order.
///
/// Entries are split on the first `=`; entries without one are skipped.
#[derive(Debug)]
pub struct JsonEnvironment<'a>(pub &'a [String]);

impl Serialize for JsonEnvironment<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (key, value) in self.0.iter().filter_map(|entry| entry.split_once('=')) {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Write the tree rooted at `root` as one line of JSON.
pub fn write_json<W: Write + ?Sized>(
    out: &mut W,
    root: &Tracee,
    exclude: &ExcludeFilter,
    include_environment: bool,
) -> io::Result<()> {
    let json = JsonTracee::new(root, exclude, include_environment);
    serde_json::to_writer(&mut *out, &json)?;
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::Pid;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn render(root: &Tracee, exclude: &ExcludeFilter, include_environment: bool) -> String {
        let mut out = Vec::new();
        write_json(&mut out, root, exclude, include_environment).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_arguments_only() {
        let mut tracee = Tracee::new(Pid::from_raw(321));
        tracee.arguments = Some(strings(&["a", "b\"c"]));

        assert_eq!(
            render(&tracee, &ExcludeFilter::none(), true),
            "{\"tid\":321,\"arguments\":[\"a\",\"b\\\"c\"]}\n"
        );
    }

    #[test]
    fn test_bare_tracee() {
        let tracee = Tracee::new(Pid::from_raw(5));
        assert_eq!(render(&tracee, &ExcludeFilter::none(), true), "{\"tid\":5}\n");
    }

    #[test]
    fn test_field_order_and_environment_object() {
        let mut tracee = Tracee::new(Pid::from_raw(9));
        tracee.working_directory = Some("/tmp".to_string());
        tracee.arguments = Some(strings(&["env"]));
        tracee.environment = Some(strings(&["Z=1", "A=x=y", "BROKEN", "EMPTY="]));

        assert_eq!(
            render(&tracee, &ExcludeFilter::none(), true),
            "{\"tid\":9,\"directory\":\"/tmp\",\"arguments\":[\"env\"],\
             \"environment\":{\"Z\":\"1\",\"A\":\"x=y\",\"EMPTY\":\"\"}}\n"
        );
    }

    #[test]
    fn test_environment_omitted_when_disabled() {
        let mut tracee = Tracee::new(Pid::from_raw(9));
        tracee.environment = Some(strings(&["HOME=/root"]));

        assert_eq!(render(&tracee, &ExcludeFilter::none(), false), "{\"tid\":9}\n");
    }

    #[test]
    fn test_control_characters_escaped() {
        let mut tracee = Tracee::new(Pid::from_raw(1));
        tracee.arguments = Some(strings(&["a\nb\tc\\d"]));

        assert_eq!(
            render(&tracee, &ExcludeFilter::none(), true),
            "{\"tid\":1,\"arguments\":[\"a\\nb\\tc\\\\d\"]}\n"
        );
    }

    #[test]
    fn test_children_nested_and_excluded_subtrees_dropped() {
        let mut root = Tracee::new(Pid::from_raw(1));
        root.arguments = Some(strings(&["make"]));
        let mut cc = Tracee::new(Pid::from_raw(2));
        cc.arguments = Some(strings(&["cc", "-c", "main.c"]));
        root.add_child(cc).add_child(Tracee::new(Pid::from_raw(4)));
        let mut ld = Tracee::new(Pid::from_raw(3));
        ld.arguments = Some(strings(&["ld", "-o", "main"]));
        root.add_child(ld).add_child(Tracee::new(Pid::from_raw(5)));

        let exclude = ExcludeFilter::from_pattern("^ld$").unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&render(&root, &exclude, false)).unwrap();

        let children = value["children"].as_array().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0]["tid"], 2);
        assert_eq!(children[0]["children"][0]["tid"], 4);
        assert!(children[0]["children"][0].get("children").is_none());
    }

    #[test]
    fn test_all_children_excluded_leaves_empty_array() {
        let mut root = Tracee::new(Pid::from_raw(1));
        let mut child = Tracee::new(Pid::from_raw(2));
        child.arguments = Some(strings(&["ld"]));
        root.add_child(child);

        let exclude = ExcludeFilter::from_pattern("ld").unwrap();
        assert_eq!(render(&root, &exclude, true), "{\"tid\":1,\"children\":[]}\n");
    }
}
