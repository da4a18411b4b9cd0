use std::collections::BTreeMap;

/// Value of a logical command option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Single(String),
    List(Vec<String>),
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Single(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::Single(value)
    }
}

impl From<Vec<String>> for OptionValue {
    fn from(values: Vec<String>) -> Self {
        OptionValue::List(values)
    }
}

pub type CommandOptions = BTreeMap<&'static str, OptionValue>;

/// Logical option to argument fragment, e.g. `name -> ["-J", "{}"]`.
pub type Fragment = (&'static str, &'static [&'static str]);

/// How one logical command (`submit`, `status`, `delete`) of a scheduler
/// translates to a command line.
#[derive(Debug, Clone, Copy)]
pub struct CommandTable {
    pub program: &'static str,
    pub fragments: &'static [Fragment],
}

impl CommandTable {
    /// Build the full invocation, program first.
    ///
    /// Fragments are emitted in table order. Absent options are skipped and
    /// list values produce one fragment per non-empty element.
    pub fn build(&self, options: &CommandOptions) -> Vec<String> {
        let mut args = vec![self.program.to_string()];
        for (name, fragment) in self.fragments {
            match options.get(name) {
                None => {}
                Some(OptionValue::Single(value)) => args.extend(fill(fragment, value)),
                Some(OptionValue::List(values)) => {
                    for value in values.iter().filter(|v| !v.is_empty()) {
                        args.extend(fill(fragment, value));
                    }
                }
            }
        }
        args
    }
}

fn fill<'a>(fragment: &'a [&'a str], value: &'a str) -> impl Iterator<Item = String> + 'a {
    fragment.iter().map(move |part| part.replace("{}", value))
}

pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@%+".contains(c))
    {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\\''"))
    }
}

/// Render an argument vector as a copy-pastable shell line.
pub fn shell_join(args: &[String]) -> String {
    args.iter()
        .map(|a| shell_quote(a))
        .collect::<Vec<_>>()
        .join(" ")
}
