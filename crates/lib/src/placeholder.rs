//! Placeholder substitution for action programs.
//!
//! Within an [`crate::eval::ActionStep`]'s `args`/`cwd`/`env` string values,
//! `${out}` resolves to the executing phase's working directory and
//! `${action:N}` resolves to the trimmed stdout of the N-th step already
//! executed in this same program. Shell variables like `$HOME` are left
//! untouched — they are resolved by the spawned interpreter, not by us.

pub struct Resolver<'a> {
  pub out: &'a str,
  pub action_results: &'a [String],
}

impl<'a> Resolver<'a> {
  pub fn resolve(&self, input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
      let Some(end_rel) = rest[start..].find('}') else {
        out.push_str(rest);
        return out;
      };
      let end = start + end_rel;
      out.push_str(&rest[..start]);
      let key = &rest[start + 2..end];
      out.push_str(&self.resolve_key(key).unwrap_or_else(|| format!("${{{key}}}")));
      rest = &rest[end + 1..];
    }
    out.push_str(rest);
    out
  }

  fn resolve_key(&self, key: &str) -> Option<String> {
    if key == "out" {
      return Some(self.out.to_string());
    }
    if let Some(idx) = key.strip_prefix("action:") {
      let idx: usize = idx.parse().ok()?;
      return self.action_results.get(idx).cloned();
    }
    None
  }
}
