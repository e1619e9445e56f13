use crate::ast::{Binding, Block, Exp, Import, PredKind, Ref};
use crate::Error;

// Postfix repetition operators, desugared onto the at-least/at-most pair
// the compiler consumes.
enum Post {
    Star,
    Plus,
    Opt,
    Range(Option<u32>, Option<u32>),
}

fn apply_post(exp: Exp, post: Post) -> Exp {
    match post {
        Post::Star => Exp::AtLeast {
            min: 0,
            exp: Box::new(exp),
        },
        Post::Plus => Exp::AtLeast {
            min: 1,
            exp: Box::new(exp),
        },
        Post::Opt => Exp::AtMost {
            max: 1,
            exp: Box::new(exp),
        },
        Post::Range(min, max) => {
            let min = min.unwrap_or(0);
            match max {
                None => Exp::AtLeast {
                    min,
                    exp: Box::new(exp),
                },
                Some(max) => Exp::Sequence(vec![
                    Exp::AtLeast {
                        min,
                        exp: Box::new(exp.clone()),
                    },
                    Exp::AtMost {
                        max: max.saturating_sub(min),
                        exp: Box::new(exp),
                    },
                ]),
            }
        }
    }
}

peg::parser!(grammar rpl() for str {
    rule ws_char() = [' ' | '\t' | '\r' | '\n']
    rule comment() = "--" [^'\n']*
    rule _ = quiet!{ (ws_char() / comment())* }
    rule ws() = quiet!{ (ws_char() / comment())+ } / expected!("whitespace")

    rule word_end() = !['a'..='z' | 'A'..='Z' | '0'..='9' | '_']
    rule keyword() = ("local" / "alias" / "grammar" / "end" / "package" / "import" / "as") word_end()

    rule ident() -> &'input str
        = s:$(quiet!{
            !keyword()
            ['a'..='z' | 'A'..='Z' | '_']
            ['a'..='z' | 'A'..='Z' | '0'..='9' | '_']*
        } / expected!("identifier"))
        { s }

    rule reference() -> Ref
        = p:ident() "." l:ident() { Ref::qualified(p, l) }
        / l:ident() { Ref::new(l) }

    rule literal() -> &'input str
        = "\"" s:$(("\\" [_] / [^'"' | '\\'])*) "\"" { s }

    rule number() -> u32
        = s:$(quiet!{['0'..='9']+} / expected!("number")) {?
            s.parse().or(Err("number"))
        }

    rule hexdig() = ['0'..='9' | 'a'..='f' | 'A'..='F']

    rule cs_char() -> &'input str
        = s:$("\\x" hexdig() hexdig()
            / "\\u" hexdig()*<4>
            / "\\U" hexdig()*<8>
            / "\\" [_]
            / [^'[' | ']' | '^' | '-' | '\\'])
        { s }

    rule complement() -> bool
        = c:"^"? { c.is_some() }

    rule cs_named() -> Exp
        = "[:" c:complement() n:ident() ":]"
        { Exp::CsNamed { name: n.to_string(), complement: c } }

    rule cs_range() -> Exp
        = "[" c:complement() f:cs_char() "-" l:cs_char() "]"
        { Exp::CsRange { first: f.to_string(), last: l.to_string(), complement: c } }

    rule cs_list() -> Exp
        = "[" c:complement() chars:cs_char()+ "]"
        { Exp::CsList { chars: chars.iter().map(|s| s.to_string()).collect(), complement: c } }

    // bracket groups: union by juxtaposition, intersection with `&`
    rule cs_group() -> Exp
        = "[" c:complement() _ first:charset() rest:(_ "&" _ x:charset() {x})+ _ "]"
        {
            let cexps = std::iter::once(first).chain(rest).collect();
            Exp::CsExp { cexp: Box::new(Exp::CsIntersection { cexps }), complement: c }
        }
        / "[" c:complement() _ first:charset() rest:(_ x:charset() {x})* _ "]"
        {
            let cexp = match rest.is_empty() {
                true => first,
                false => Exp::CsUnion { cexps: std::iter::once(first).chain(rest).collect() },
            };
            Exp::CsExp { cexp: Box::new(cexp), complement: c }
        }

    rule charset() -> Exp
        = cs_named() / cs_range() / cs_list() / cs_group()

    rule application() -> Exp
        = id:reference() ":" args:arglist()
        { Exp::Application { id, args } }

    rule arglist() -> Vec<Exp>
        = "(" _ args:(arg() ** (_ "," _)) _ ")" { args }
        / a:bare_arg() { vec![a] }

    rule arg() -> Exp
        = l:literal() { Exp::RplString(l.to_string()) }
        / expression()

    rule bare_arg() -> Exp
        = l:literal() { Exp::RplString(l.to_string()) }
        / repetition()

    rule primary() -> Exp
        = l:literal() { Exp::Literal(l.to_string()) }
        / "#" t:ident() { Exp::Hashtag(t.to_string()) }
        / charset()
        / application()
        / r:reference() { Exp::Ref(r) }
        / "{" _ e:expression() _ "}" { e }
        / "(" _ e:expression() _ ")" { e }

    rule predicated() -> Exp
        = ">" _ e:predicated() { Exp::Predicate { kind: PredKind::LookAhead, exp: Box::new(e) } }
        / "!" _ e:predicated() { Exp::Predicate { kind: PredKind::Negation, exp: Box::new(e) } }
        / "<" _ e:predicated() { Exp::Predicate { kind: PredKind::LookBehind, exp: Box::new(e) } }
        / primary()

    rule postfix() -> Post
        = "*" { Post::Star }
        / "+" { Post::Plus }
        / "?" { Post::Opt }
        / "{" _ n:number()? _ "," _ m:number()? _ "}" { Post::Range(n, m) }
        / "{" _ n:number() _ "}" { Post::Range(Some(n), Some(n)) }

    rule repetition() -> Exp
        = p:predicated() post:postfix()*
        { post.into_iter().fold(p, apply_post) }

    // a sequence item must not swallow the next statement's left-hand side
    rule binding_start() = ident() _ "="

    rule sequence() -> Exp
        = first:repetition() rest:(ws() !binding_start() x:repetition() {x})*
        {
            match rest.is_empty() {
                true => first,
                false => Exp::Sequence(std::iter::once(first).chain(rest).collect()),
            }
        }

    rule expression() -> Exp
        = first:sequence() rest:(_ "/" _ x:sequence() {x})*
        {
            match rest.is_empty() {
                true => first,
                false => Exp::Choice(std::iter::once(first).chain(rest).collect()),
            }
        }

    rule binding() -> Binding
        = start:position!()
            l:("local" ws())? a:("alias" ws())? i:ident() _ "=" _ e:expression()
            end:position!()
        {
            Binding {
                id: Ref::new(i),
                exp: e,
                alias: a.is_some(),
                local: l.is_some(),
                span: Some((start, end)),
            }
        }

    // the first rule names the grammar and becomes its start rule
    rule grammar_stmt() -> Binding
        = start:position!() "grammar" ws() rules:(binding() ++ ws()) ws() "end" end:position!()
        {?
            let head = rules.first().ok_or("grammar rule")?;
            let (id, alias, local) = (head.id.clone(), head.alias, head.local);
            Ok(Binding {
                id,
                exp: Exp::Grammar { rules },
                alias,
                local,
                span: Some((start, end)),
            })
        }

    rule statement() -> Binding
        = grammar_stmt() / binding()

    rule package_decl() -> String
        = "package" ws() i:ident() { i.to_string() }

    rule importpath() -> String
        = l:literal() { l.to_string() }
        / s:$(ident() ("/" ident())*) { s.to_string() }

    rule import_prefix() -> String
        = "." { ".".to_string() }
        / i:ident() { i.to_string() }

    rule import_decl() -> Import
        = "import" ws() path:importpath() pre:(ws() "as" ws() p:import_prefix() {p})?
        { Import { importpath: path, prefix: pre } }

    pub rule toplevel_block() -> Block
        = _ p:(x:package_decl() _ {x})? imports:(i:import_decl() _ {i})* stmts:(s:statement() _ {s})* ![_]
        { Block { package: p, imports, stmts, source: None } }

    pub rule toplevel_expression() -> Exp
        = _ e:expression() _ ![_] { e }
});

fn peg_error(msg: &str, err: peg::error::ParseError<peg::str::LineCol>) -> Error {
    Error::Parse(format!("{msg}: {err}"))
}

/// Parse a top-level block of statements.
pub fn block(src: &str) -> crate::Result<Block> {
    let mut block =
        rpl::toplevel_block(src).map_err(|e| peg_error("invalid RPL block", e))?;
    block.source = Some(src.to_string());
    Ok(block)
}

/// Parse a single pattern expression.
pub fn expression(src: &str) -> crate::Result<Exp> {
    rpl::toplevel_expression(src).map_err(|e| peg_error("invalid RPL expression", e))
}
