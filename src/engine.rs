use crate::compile::{self, LoadRequest};
use crate::env::{Env, Package, Packages};
use crate::parse;
use crate::pattern::Pattern;
use crate::peg::MatchResult;
use crate::violation::{Kind, Violation, Violations};
use crate::Result;

/// A compilation engine: the package environment, the loaded-package
/// registry, and the accumulated diagnostics.
///
/// Engines are single-threaded; compiled patterns taken out of one are
/// immutable and freely shareable.
#[derive(Debug)]
pub struct Engine {
    env: Env,
    packages: Packages,
    messages: Violations,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Engine {
            env: Env::standard(),
            packages: Packages::default(),
            messages: Violations::default(),
        }
    }

    fn parse_block(&mut self, src: &str) -> Result<crate::ast::Block> {
        parse::block(src).map_err(|e| {
            self.messages
                .push(Violation::new(Kind::Syntax, "parser", e.to_string()));
            e
        })
    }

    /// Parse and compile a block into the engine environment. Per-binding
    /// compile failures land in the message sink; the call itself only
    /// fails on syntax errors.
    pub fn load(&mut self, src: &str) -> Result<Option<String>> {
        let block = self.parse_block(src)?;
        compile::compile_block(&block, &mut self.env, None, &mut self.messages)
    }

    /// Compile a block as a package, register it under `importpath`, and
    /// expose its exports under the requested prefix (the declared package
    /// name when no prefix is given, `"."` to import unprefixed).
    pub fn import(
        &mut self,
        importpath: &str,
        src: &str,
        prefix: Option<&str>,
    ) -> Result<Option<String>> {
        let block = self.parse_block(src)?;
        let request = LoadRequest {
            importpath: Some(importpath.to_string()),
            prefix: prefix.map(String::from),
            packagename: block.package.clone(),
        };

        let mut pkgenv = Env::standard();
        let name = compile::compile_block(&block, &mut pkgenv, Some(&request), &mut self.messages)?;
        let bindings = pkgenv.pop();

        tracing::debug!("registering package {}", importpath);
        self.packages.register(
            importpath,
            Package {
                name: name.clone(),
                bindings: bindings.clone(),
            },
        )?;

        match prefix {
            Some(".") => {
                for (id, binding) in bindings {
                    if binding.exported() {
                        self.env.bind(id, binding);
                    }
                }
            }
            _ => {
                let visible = prefix
                    .or(name.as_deref())
                    .map(String::from)
                    .unwrap_or_else(|| {
                        importpath
                            .rsplit('/')
                            .next()
                            .unwrap_or(importpath)
                            .to_string()
                    });
                self.env.import(visible, bindings);
            }
        }
        Ok(name)
    }

    /// Compile an ad-hoc expression against the engine environment.
    pub fn compile(&mut self, src: &str) -> Result<Pattern> {
        let exp = parse::expression(src).map_err(|e| {
            self.messages
                .push(Violation::new(Kind::Syntax, "parser", e.to_string()));
            e
        })?;
        compile::compile_expression(&exp, &mut self.env)
    }

    /// Match a compiled pattern anchored at the start of `input`.
    pub fn matches(&self, pattern: &Pattern, input: &str) -> Option<MatchResult> {
        pattern.peg.match_bytes(input.as_bytes())
    }

    pub fn messages(&self) -> &Violations {
        &self.messages
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn packages(&self) -> &Packages {
        &self.packages
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn test_named_bindings_and_repetition() {
        let mut e = Engine::new();
        e.load("a = [0-9]\nb = a+").unwrap();
        assert!(e.messages().is_clean());

        let b = e.compile("b").unwrap();
        let m = e.matches(&b, "123").unwrap();
        assert_eq!(m.end, 3);
        assert_eq!(m.captures.len(), 1);

        let top = &m.captures[0];
        assert_eq!(top.label, "b");
        assert_eq!((top.start, top.end), (0, 3));
        let subs: Vec<_> = top
            .subs
            .iter()
            .map(|s| (s.label.as_str(), s.start, s.end))
            .collect();
        assert_eq!(subs, vec![("a", 0, 1), ("a", 1, 2), ("a", 2, 3)]);
    }

    #[test]
    fn test_partial_match() {
        let mut e = Engine::new();
        e.load("digit = [0-9]\nnum = digit+").unwrap();
        let num = e.compile("num").unwrap();
        let m = e.matches(&num, "42x").unwrap();
        assert_eq!(m.end, 2);
        assert_eq!(m.captures[0].label, "num");
        assert_eq!((m.captures[0].start, m.captures[0].end), (0, 2));
    }

    #[test]
    fn test_negation() {
        let mut e = Engine::new();
        e.load("x = \"hi\"\ny = !x").unwrap();
        let y = e.compile("y").unwrap();
        assert!(e.matches(&y, "hi").is_none());
        let m = e.matches(&y, "bye").unwrap();
        assert_eq!(m.end, 0);
    }

    #[test]
    fn test_recursive_grammar() {
        let mut e = Engine::new();
        e.load(indoc! {r#"
            grammar
              S = {"a" S "b"} / ""
            end
        "#})
        .unwrap();
        assert!(e.messages().is_clean());

        let s = e.compile("S").unwrap();
        assert_eq!(e.matches(&s, "aaabbb").map(|m| m.end), Some(6));
        // no full match for unbalanced input
        assert_eq!(e.matches(&s, "aab").map(|m| m.end), Some(0));
    }

    #[test]
    fn test_grammar_rule_labels() {
        let mut e = Engine::new();
        e.load(indoc! {r#"
            grammar
              list = elem {"," elem}*
              elem = [0-9]+
            end
        "#})
        .unwrap();
        assert!(e.messages().is_clean());

        let list = e.compile("list").unwrap();
        let m = e.matches(&list, "1,23").unwrap();
        assert_eq!(m.end, 4);
        assert_eq!(m.captures[0].label, "list");
        let subs: Vec<_> = m.captures[0]
            .subs
            .iter()
            .map(|s| s.label.as_str())
            .collect();
        assert_eq!(subs, vec!["list.elem", "list.elem"]);
    }

    #[test]
    fn test_forward_references_fail() {
        let mut e = Engine::new();
        // completes with diagnostics, not an error
        e.load("a = b\nb = a").unwrap();
        assert!(!e.messages().is_clean());

        let errors: Vec<_> = e
            .messages()
            .iter()
            .filter(|v| v.kind == Kind::Compile)
            .map(|v| v.message.clone())
            .collect();
        assert_eq!(
            errors,
            vec!["unbound identifier: b", "unbound identifier: a"]
        );

        // both identifiers stay unbound
        assert!(e.compile("a").is_err());
        assert!(e.compile("b").is_err());
    }

    #[test]
    fn test_alias_neutrality() {
        let mut e = Engine::new();
        e.load("alias a = [0-9]+\nb = a").unwrap();

        let b = e.compile("b").unwrap();
        let m = e.matches(&b, "42").unwrap();
        assert_eq!(m.end, 2);
        assert_eq!(m.captures[0].label, "b");
        assert!(m.captures[0].subs.is_empty());

        // an alias compiled at top level gets the anonymous label
        let a = e.compile("a").unwrap();
        let m = e.matches(&a, "42").unwrap();
        assert_eq!(m.captures[0].label, "*");
    }

    #[test]
    fn test_anonymous_wrap() {
        let mut e = Engine::new();
        let pat = e.compile("[0-9]+").unwrap();
        assert!(!pat.alias);
        let m = e.matches(&pat, "7x").unwrap();
        assert_eq!(m.captures[0].label, "*");
        assert_eq!(m.end, 1);
    }

    #[test]
    fn test_import_prefixes_labels() {
        let mut e = Engine::new();
        let src = indoc! {r#"
            package bal
            grammar
              S = {"a" S "b"} / ""
            end
        "#};
        let name = e.import("test/bal", src, None).unwrap();
        assert_eq!(name.as_deref(), Some("bal"));
        assert!(e.packages().get("test/bal").is_some());

        let s = e.compile("bal.S").unwrap();
        let m = e.matches(&s, "ab").unwrap();
        assert_eq!(m.end, 2);
        assert_eq!(m.captures[0].label, "bal.S");

        // registration is write-once
        assert!(e.import("test/bal", src, None).is_err());
    }

    #[test]
    fn test_import_unprefixed() {
        let mut e = Engine::new();
        e.import("words", "package words\nw = [:alpha:]+", Some("."))
            .unwrap();
        let w = e.compile("w").unwrap();
        let m = e.matches(&w, "hello ").unwrap();
        assert_eq!(m.end, 5);
        // a "." prefix leaves capture labels unqualified
        assert_eq!(m.captures[0].label, "w");
    }

    #[test]
    fn test_local_bindings_stay_private() {
        let mut e = Engine::new();
        e.import("nums", "package nums\nlocal sep = \".\"\nnum = [0-9]+", None)
            .unwrap();
        assert!(e.compile("nums.num").is_ok());
        assert!(e.compile("nums.sep").is_err());
    }

    #[test]
    fn test_rebinding_note() {
        let mut e = Engine::new();
        e.load("a = \"x\"").unwrap();
        e.load("a = \"y\"").unwrap();
        assert!(e.messages().is_clean());
        assert!(e
            .messages()
            .iter()
            .any(|v| v.kind == Kind::Info && v.message.contains("rebinding a")));
    }

    #[test]
    fn test_syntax_violation_recorded() {
        let mut e = Engine::new();
        assert!(e.load("a = ").is_err());
        assert!(e
            .messages()
            .iter()
            .any(|v| v.kind == Kind::Syntax && v.who == "parser"));
    }

    #[test]
    fn test_compile_error_has_sourceref() {
        let mut e = Engine::new();
        e.load("a = \"\\q\"").unwrap();
        let v = e
            .messages()
            .iter()
            .find(|v| v.kind == Kind::Compile)
            .unwrap();
        assert_eq!(v.message, "invalid escape sequence in literal: \\q");
        let sr = v.sourceref.as_ref().unwrap();
        assert_eq!(sr.text, "a = \"\\q\"");
    }
}
