//! Pratt-parser grammar: the precedence table, expression handlers, and the
//! call-compilation machinery shared with method definitions.

use crate::bytecode::{Op, MAX_PARAMETERS};
use crate::lexer::TokenKind;
use crate::value::Value;

use super::signature::{Signature, SignatureType};
use super::{Compiler, LoadKind, Local, MAX_FIELDS};

/// Expression precedence, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub(super) enum Precedence {
    None,
    Lowest,
    Assignment, // =
    Ternary,    // ?:
    LogicalOr,  // ||
    LogicalAnd, // &&
    Equality,   // == !=
    Is,         // is
    Comparison, // < > <= >=
    BitwiseOr,  // |
    BitwiseXor, // ^
    BitwiseAnd, // &
    Shift,      // << >>
    Range,      // .. ...
    Term,       // + -
    Factor,     // * / %
    Unary,      // unary - ! ~
    Call,       // . () []
    Primary,
}

impl Precedence {
    /// One level tighter, for right operands of left-associative operators.
    pub(super) fn next(self) -> Precedence {
        let raw = (self as u8 + 1).min(Precedence::Primary as u8);
        // Safe: Precedence is repr(u8) with contiguous discriminants.
        unsafe { std::mem::transmute::<u8, Precedence>(raw) }
    }
}

type GrammarFn = fn(&mut Compiler, bool);
type SignatureFn = fn(&mut Compiler, &mut Signature);

/// Parsing behavior for one token kind: an optional prefix handler, infix
/// handler, and method-signature handler. The signature handler is what lets
/// operator/subscript/constructor definitions reuse the expression grammar.
pub(super) struct GrammarRule {
    pub prefix: Option<GrammarFn>,
    pub infix: Option<GrammarFn>,
    pub method: Option<SignatureFn>,
    pub precedence: Precedence,
    pub name: &'static str,
}

const fn unused() -> GrammarRule {
    GrammarRule {
        prefix: None,
        infix: None,
        method: None,
        precedence: Precedence::None,
        name: "",
    }
}

const fn prefix(handler: GrammarFn) -> GrammarRule {
    GrammarRule {
        prefix: Some(handler),
        infix: None,
        method: None,
        precedence: Precedence::None,
        name: "",
    }
}

const fn infix(precedence: Precedence, handler: GrammarFn) -> GrammarRule {
    GrammarRule {
        prefix: None,
        infix: Some(handler),
        method: None,
        precedence,
        name: "",
    }
}

const fn infix_operator(precedence: Precedence, name: &'static str) -> GrammarRule {
    GrammarRule {
        prefix: None,
        infix: Some(infix_op),
        method: Some(infix_signature),
        precedence,
        name,
    }
}

const fn prefix_operator(name: &'static str) -> GrammarRule {
    GrammarRule {
        prefix: Some(unary_op),
        infix: None,
        method: Some(unary_signature),
        precedence: Precedence::None,
        name,
    }
}

/// An operator that is both unary prefix and binary infix, like `-`.
const fn operator(name: &'static str) -> GrammarRule {
    GrammarRule {
        prefix: Some(unary_op),
        infix: Some(infix_op),
        method: Some(mixed_signature),
        precedence: Precedence::Term,
        name,
    }
}

/// The grammar rule for a token kind.
pub(super) fn rule(kind: &TokenKind) -> GrammarRule {
    match kind {
        TokenKind::LeftParen => prefix(grouping),
        TokenKind::LeftBracket => GrammarRule {
            prefix: Some(list_literal),
            infix: Some(subscript),
            method: Some(subscript_signature),
            precedence: Precedence::Call,
            name: "",
        },
        TokenKind::LeftBrace => prefix(map_literal),
        TokenKind::Dot => infix(Precedence::Call, call),
        TokenKind::DotDot => infix_operator(Precedence::Range, ".."),
        TokenKind::DotDotDot => infix_operator(Precedence::Range, "..."),
        TokenKind::Star => infix_operator(Precedence::Factor, "*"),
        TokenKind::Slash => infix_operator(Precedence::Factor, "/"),
        TokenKind::Percent => infix_operator(Precedence::Factor, "%"),
        TokenKind::Plus => infix_operator(Precedence::Term, "+"),
        TokenKind::Minus => operator("-"),
        TokenKind::LtLt => infix_operator(Precedence::Shift, "<<"),
        TokenKind::GtGt => infix_operator(Precedence::Shift, ">>"),
        TokenKind::Pipe => infix_operator(Precedence::BitwiseOr, "|"),
        TokenKind::PipePipe => infix(Precedence::LogicalOr, or_),
        TokenKind::Caret => infix_operator(Precedence::BitwiseXor, "^"),
        TokenKind::Amp => infix_operator(Precedence::BitwiseAnd, "&"),
        TokenKind::AmpAmp => infix(Precedence::LogicalAnd, and_),
        TokenKind::Bang => prefix_operator("!"),
        TokenKind::Tilde => prefix_operator("~"),
        TokenKind::Question => infix(Precedence::Assignment, conditional),
        TokenKind::Lt => infix_operator(Precedence::Comparison, "<"),
        TokenKind::Gt => infix_operator(Precedence::Comparison, ">"),
        TokenKind::LtEq => infix_operator(Precedence::Comparison, "<="),
        TokenKind::GtEq => infix_operator(Precedence::Comparison, ">="),
        TokenKind::EqEq => infix_operator(Precedence::Equality, "=="),
        TokenKind::BangEq => infix_operator(Precedence::Equality, "!="),
        TokenKind::Is => infix_operator(Precedence::Is, "is"),
        TokenKind::Construct => GrammarRule {
            prefix: None,
            infix: None,
            method: Some(constructor_signature),
            precedence: Precedence::None,
            name: "",
        },
        TokenKind::False | TokenKind::True => prefix(boolean),
        TokenKind::Null => prefix(null_literal),
        TokenKind::Super => prefix(super_),
        TokenKind::This => prefix(this_),
        TokenKind::Field(_) => prefix(field),
        TokenKind::StaticField(_) => prefix(static_field),
        TokenKind::Name(_) => GrammarRule {
            prefix: Some(name),
            infix: None,
            method: Some(named_signature),
            precedence: Precedence::None,
            name: "",
        },
        TokenKind::Number(_) => prefix(number),
        TokenKind::Str(_) => prefix(string_literal),
        _ => unused(),
    }
}

impl Compiler<'_> {
    /// Parse an expression. Unlike statements, expressions leave a value on
    /// the stack.
    pub(super) fn expression(&mut self) {
        self.parse_precedence(true, Precedence::Lowest);
    }

    /// The main entrypoint of the top-down operator precedence parser.
    pub(super) fn parse_precedence(&mut self, allow_assignment: bool, precedence: Precedence) {
        self.next_token();

        let Some(prefix_fn) = rule(&self.previous.kind).prefix else {
            self.error("Expected expression.");
            return;
        };
        prefix_fn(self, allow_assignment);

        while rule(&self.current.kind).precedence >= precedence {
            self.next_token();
            if let Some(infix_fn) = rule(&self.previous.kind).infix {
                infix_fn(self, allow_assignment);
            }
        }
    }

    pub(super) fn validate_num_parameters(&mut self, num_args: usize) {
        // Only error at exactly max + 1 so parsing continues with minimal
        // cascading.
        if num_args == MAX_PARAMETERS + 1 {
            self.error(&format!(
                "Methods cannot have more than {} parameters.",
                MAX_PARAMETERS
            ));
        }
    }

    /// Parse a comma-separated parameter list, declaring a local for each
    /// parameter and counting them in `signature`.
    pub(super) fn finish_parameter_list(&mut self, signature: &mut Signature) {
        loop {
            self.ignore_newlines();
            signature.arity += 1;
            let arity = signature.arity;
            self.validate_num_parameters(arity);
            self.declare_named_variable();
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
    }

    /// Parse a comma-separated argument list, counting the arguments in
    /// `signature`.
    pub(super) fn finish_argument_list(&mut self, signature: &mut Signature) {
        loop {
            self.ignore_newlines();
            signature.arity += 1;
            let arity = signature.arity;
            self.validate_num_parameters(arity);
            self.expression();
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        // Allow a newline before the closing delimiter.
        self.ignore_newlines();
    }

    /// Emit the call for `signature`. Super calls also reserve a constant
    /// slot that method binding patches with the statically-known
    /// superclass, so an inherited method still calls the right target.
    pub(super) fn call_signature(&mut self, is_super: bool, signature: &Signature) {
        let symbol = self.signature_symbol(signature) as u16;
        let op = if is_super {
            Op::super_call(signature.arity)
        } else {
            Op::call(signature.arity)
        };
        self.emit_short_arg(op, symbol);

        if is_super {
            let constant = self.add_constant(Value::Null);
            self.emit_short(constant);
        }
    }

    /// Emit a call to the method whose canonical signature is `name`.
    pub(super) fn call_method(&mut self, num_args: usize, name: &str) {
        let symbol = self.method_symbol(name) as u16;
        self.emit_short_arg(Op::call(num_args), symbol);
    }

    /// Compile an (optional) argument list and block argument, then the call.
    pub(super) fn method_call(&mut self, is_super: bool, signature: &Signature) {
        let mut called = Signature::new(signature.name.clone(), SignatureType::Getter, 0);

        if self.match_token(&TokenKind::LeftParen) {
            called.sig_type = SignatureType::Method;
            if !self.check(&TokenKind::RightParen) {
                self.finish_argument_list(&mut called);
            }
            self.consume(&TokenKind::RightParen, "Expect ')' after arguments.");
        }

        // A trailing block argument counts toward the arity.
        if self.match_token(&TokenKind::LeftBrace) {
            called.sig_type = SignatureType::Method;
            called.arity += 1;

            self.push_fn_compiler(false);

            let mut fn_signature = Signature::default();
            if self.match_token(&TokenKind::Pipe) {
                self.finish_parameter_list(&mut fn_signature);
                self.consume(&TokenKind::Pipe, "Expect '|' after function parameters.");
            }
            self.current_fn().num_params = fn_signature.arity;

            self.finish_body(false);

            let block_name = format!("{} block argument", called);
            self.end_compiler(block_name);
        }

        // A super() call in an initializer must chain into the superclass
        // initializer, which requires an argument list.
        if signature.sig_type == SignatureType::Initializer {
            if called.sig_type != SignatureType::Method {
                self.error("A superclass constructor must have an argument list.");
            }
            called.sig_type = SignatureType::Initializer;
        }

        self.call_signature(is_super, &called);
    }

    /// Compile a call whose name is the previously consumed token: getters,
    /// calls with arguments, and setter assignments.
    pub(super) fn named_call(&mut self, allow_assignment: bool, is_super: bool) {
        let mut signature = self.signature_from_token(SignatureType::Getter);

        if self.match_token(&TokenKind::Eq) {
            if !allow_assignment {
                self.error("Invalid assignment.");
            }
            self.ignore_newlines();

            signature.sig_type = SignatureType::Setter;
            signature.arity = 1;

            self.expression();
            self.call_signature(is_super, &signature);
        } else {
            self.method_call(is_super, &signature);
        }
    }

    /// Compile an optional setter parameter. Returns true if it was one.
    fn maybe_setter(&mut self, signature: &mut Signature) -> bool {
        if !self.match_token(&TokenKind::Eq) {
            return false;
        }

        signature.sig_type = if signature.sig_type == SignatureType::Subscript {
            SignatureType::SubscriptSetter
        } else {
            SignatureType::Setter
        };

        self.consume(&TokenKind::LeftParen, "Expect '(' after '='.");
        self.declare_named_variable();
        self.consume(&TokenKind::RightParen, "Expect ')' after parameter name.");

        signature.arity += 1;
        true
    }

    /// Parse an optional parenthesized parameter list for a method
    /// signature.
    fn parameter_list(&mut self, signature: &mut Signature) {
        if !self.match_token(&TokenKind::LeftParen) {
            return;
        }
        signature.sig_type = SignatureType::Method;

        if self.match_token(&TokenKind::RightParen) {
            return;
        }
        self.finish_parameter_list(signature);
        self.consume(&TokenKind::RightParen, "Expect ')' after parameters.");
    }

    /// Implicitly declare a static field as a local of the function holding
    /// the class body, initialized to null in that code stream.
    fn hoist_static_field(&mut self, class_fn: usize, name: &str) {
        let depth = self.fns[class_fn].scope_depth;
        self.fns[class_fn].locals.push(Local {
            name: name.to_string(),
            depth,
            is_upvalue: false,
        });

        let line = self.previous.span.line as u32;
        self.fns[class_fn].bytecode.push(Op::Null as u8);
        self.fns[class_fn].source_lines.push(line);
    }
}

// ===== Prefix and infix handlers =====

/// A parenthesized expression.
fn grouping(c: &mut Compiler, _allow_assignment: bool) {
    c.expression();
    c.consume(&TokenKind::RightParen, "Expect ')' after expression.");
}

/// A list literal compiles to `List.new()` followed by an `add(_)` call per
/// element.
fn list_literal(c: &mut Compiler, _allow_assignment: bool) {
    c.load_core_variable("List");
    c.call_method(0, "new()");

    if !c.check(&TokenKind::RightBracket) {
        loop {
            c.ignore_newlines();
            if c.check(&TokenKind::RightBracket) {
                break;
            }

            // Copy the list; the add() call consumes its receiver.
            c.emit_op(Op::Dup);
            c.expression();
            c.call_method(1, "add(_)");
            c.emit_op(Op::Pop);

            if !c.match_token(&TokenKind::Comma) {
                break;
            }
        }
    }

    c.ignore_newlines();
    c.consume(&TokenKind::RightBracket, "Expect ']' after list elements.");
}

/// A map literal compiles to `Map.new()` followed by a subscript-setter call
/// per entry.
fn map_literal(c: &mut Compiler, _allow_assignment: bool) {
    c.load_core_variable("Map");
    c.call_method(0, "new()");

    if !c.check(&TokenKind::RightBrace) {
        loop {
            c.ignore_newlines();
            if c.check(&TokenKind::RightBrace) {
                break;
            }

            c.emit_op(Op::Dup);
            c.parse_precedence(false, Precedence::Primary);
            c.consume(&TokenKind::Colon, "Expect ':' after map key.");
            c.expression();
            c.call_method(2, "[_]=(_)");
            c.emit_op(Op::Pop);

            if !c.match_token(&TokenKind::Comma) {
                break;
            }
        }
    }

    c.ignore_newlines();
    c.consume(&TokenKind::RightBrace, "Expect '}' after map entries.");
}

/// Unary operators like `-foo` call the operator method on the operand.
fn unary_op(c: &mut Compiler, _allow_assignment: bool) {
    let name = rule(&c.previous.kind).name;

    c.ignore_newlines();
    c.parse_precedence(false, Precedence::Unary.next());
    c.call_method(0, name);
}

/// Infix operators call the operator method on the left-hand side.
fn infix_op(c: &mut Compiler, _allow_assignment: bool) {
    let op_rule = rule(&c.previous.kind);

    // An infix operator cannot end an expression.
    c.ignore_newlines();

    c.parse_precedence(false, op_rule.precedence.next());

    let signature = Signature::new(op_rule.name, SignatureType::Method, 1);
    c.call_signature(false, &signature);
}

fn boolean(c: &mut Compiler, _allow_assignment: bool) {
    let op = if c.previous.kind == TokenKind::False {
        Op::False
    } else {
        Op::True
    };
    c.emit_op(op);
}

fn null_literal(c: &mut Compiler, _allow_assignment: bool) {
    c.emit_op(Op::Null);
}

fn number(c: &mut Compiler, _allow_assignment: bool) {
    let value = match c.previous.kind {
        TokenKind::Number(n) => n,
        _ => 0.0,
    };
    let constant = c.add_constant(Value::Num(value));
    c.emit_short_arg(Op::Constant, constant);
}

fn string_literal(c: &mut Compiler, _allow_assignment: bool) {
    let text = match &c.previous.kind {
        TokenKind::Str(s) => s.clone(),
        _ => String::new(),
    };
    let constant = c.add_constant(Value::string(text));
    c.emit_short_arg(Op::Constant, constant);
}

/// An instance field reference, implicitly declaring the field on first use.
fn field(c: &mut Compiler, allow_assignment: bool) {
    // A fake slot keeps parsing useful after an error.
    let mut field_index = MAX_FIELDS;

    let enclosing = c.enclosing_class_index();
    match enclosing {
        None => c.error("Cannot reference a field outside of a class definition."),
        Some(class_fn) => {
            let in_static = c.fns[class_fn]
                .class_info
                .as_ref()
                .map(|info| info.is_static_method)
                .unwrap_or(false);
            if in_static {
                c.error("Cannot use an instance field in a static method.");
            } else {
                let field_name = match &c.previous.kind {
                    TokenKind::Field(name) => name.clone(),
                    _ => String::new(),
                };
                if let Some(info) = c.fns[class_fn].class_info.as_mut() {
                    field_index = match info.fields.iter().position(|f| *f == field_name) {
                        Some(index) => index,
                        None => {
                            info.fields.push(field_name);
                            info.fields.len() - 1
                        }
                    };
                }
                if field_index >= MAX_FIELDS {
                    c.error(&format!("A class can only have {} fields.", MAX_FIELDS));
                }
            }
        }
    }

    let mut is_load = true;
    if c.match_token(&TokenKind::Eq) {
        if !allow_assignment {
            c.error("Invalid assignment.");
        }
        c.expression();
        is_load = false;
    }

    // Directly inside a method the receiver is in slot zero, so the
    // this-relative instructions are enough; nested functions must load
    // `this` through the scope chain first.
    let directly_in_method = c.fns.len() >= 2 && enclosing == Some(c.fns.len() - 2);
    if directly_in_method {
        let op = if is_load {
            Op::LoadFieldThis
        } else {
            Op::StoreFieldThis
        };
        c.emit_byte_arg(op, field_index as u8);
    } else {
        c.load_this();
        let op = if is_load { Op::LoadField } else { Op::StoreField };
        c.emit_byte_arg(op, field_index as u8);
    }
}

/// A static field reference. The field is hoisted into a local of the scope
/// surrounding the class definition; methods reach it as an upvalue.
fn static_field(c: &mut Compiler, allow_assignment: bool) {
    let field_name = match &c.previous.kind {
        TokenKind::StaticField(name) => name.clone(),
        _ => String::new(),
    };

    match c.enclosing_class_index() {
        None => {
            c.error("Cannot use a static field outside of a class definition.");
            c.variable(allow_assignment, MAX_FIELDS, LoadKind::Local);
        }
        Some(class_fn) => {
            if c.resolve_local(class_fn, &field_name).is_none() {
                c.hoist_static_field(class_fn, &field_name);
            }

            // Resolve through the full scope chain; from inside a method the
            // hoisted local is reached as an upvalue.
            match c.resolve_name(&field_name) {
                Some((index, kind)) => c.variable(allow_assignment, index, kind),
                None => c.variable(allow_assignment, MAX_FIELDS, LoadKind::Local),
            }
        }
    }
}

/// A bare name: a local, an upvalue, an implicit self-send, or a module
/// variable.
fn name(c: &mut Compiler, allow_assignment: bool) {
    let var_name = match &c.previous.kind {
        TokenKind::Name(n) => n.clone(),
        _ => String::new(),
    };

    if let Some((index, kind)) = c.resolve_non_module(&var_name) {
        c.variable(allow_assignment, index, kind);
        return;
    }

    // Inside a method, a lowercase bare name is a call on `this`.
    if is_local_name(&var_name) && c.enclosing_class_index().is_some() {
        c.load_this();
        c.named_call(allow_assignment, false);
        return;
    }

    let module_symbol = c.module.borrow().find_variable(&var_name);
    let module_symbol = match module_symbol {
        Some(symbol) => symbol,
        None => {
            if is_local_name(&var_name) {
                c.error("Undefined variable.");
                return;
            }

            // A nonlocal name may be defined further down the module, so
            // implicitly declare it and check at the end of compilation.
            let module = c.module.clone();
            match c.vm.declare_variable(&module, &var_name) {
                Ok(symbol) => symbol,
                Err(_) => {
                    c.error("Too many module variables defined.");
                    return;
                }
            }
        }
    };

    c.variable(allow_assignment, module_symbol, LoadKind::ModuleVar);
}

/// Module variables are conventionally capitalized; a lowercase name is
/// local-like and must resolve before use.
fn is_local_name(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_lowercase())
}

fn this_(c: &mut Compiler, _allow_assignment: bool) {
    if c.enclosing_class_index().is_none() {
        c.error("Cannot use 'this' outside of a method.");
        return;
    }
    c.load_this();
}

fn super_(c: &mut Compiler, allow_assignment: bool) {
    let enclosing = c.enclosing_class_index();
    if enclosing.is_none() {
        c.error("Cannot use 'super' outside of a method.");
    }

    c.load_this();

    if c.match_token(&TokenKind::Dot) {
        // A named super call.
        c.consume(
            &TokenKind::Name(String::new()),
            "Expect method name after 'super.'.",
        );
        c.named_call(allow_assignment, true);
    } else if let Some(class_fn) = enclosing {
        // No explicit name: use the signature of the enclosing method.
        let signature = c.fns[class_fn]
            .class_info
            .as_ref()
            .and_then(|info| info.signature.clone());
        if let Some(signature) = signature {
            c.method_call(true, &signature);
        }
    }
}

/// Subscript, like `receiver[args]`, optionally a subscript-setter.
fn subscript(c: &mut Compiler, allow_assignment: bool) {
    let mut signature = Signature::new("", SignatureType::Subscript, 0);

    c.finish_argument_list(&mut signature);
    c.consume(&TokenKind::RightBracket, "Expect ']' after arguments.");

    if c.match_token(&TokenKind::Eq) {
        if !allow_assignment {
            c.error("Invalid assignment.");
        }
        signature.sig_type = SignatureType::SubscriptSetter;

        signature.arity += 1;
        let arity = signature.arity;
        c.validate_num_parameters(arity);

        c.expression();
    }

    c.call_signature(false, &signature);
}

/// A `.name` call.
fn call(c: &mut Compiler, allow_assignment: bool) {
    c.ignore_newlines();
    c.consume(&TokenKind::Name(String::new()), "Expect method name after '.'.");
    c.named_call(allow_assignment, false);
}

fn and_(c: &mut Compiler, _allow_assignment: bool) {
    c.ignore_newlines();

    // Skip the right operand if the left is falsy.
    let jump = c.emit_jump(Op::And);
    c.parse_precedence(false, Precedence::LogicalAnd);
    c.patch_jump(jump);
}

fn or_(c: &mut Compiler, _allow_assignment: bool) {
    c.ignore_newlines();

    // Skip the right operand if the left is truthy.
    let jump = c.emit_jump(Op::Or);
    c.parse_precedence(false, Precedence::LogicalOr);
    c.patch_jump(jump);
}

/// The ternary conditional `cond ? then : else`.
fn conditional(c: &mut Compiler, allow_assignment: bool) {
    c.ignore_newlines();

    let if_jump = c.emit_jump(Op::JumpIf);

    c.parse_precedence(allow_assignment, Precedence::Ternary);

    c.consume(
        &TokenKind::Colon,
        "Expect ':' after then branch of conditional operator.",
    );
    c.ignore_newlines();

    let else_jump = c.emit_jump(Op::Jump);
    c.patch_jump(if_jump);

    c.parse_precedence(allow_assignment, Precedence::Assignment);
    c.patch_jump(else_jump);
}

// ===== Signature handlers =====

/// Signature of an infix operator definition: one right-hand parameter.
fn infix_signature(c: &mut Compiler, signature: &mut Signature) {
    signature.sig_type = SignatureType::Method;
    signature.arity = 1;

    c.consume(&TokenKind::LeftParen, "Expect '(' after operator name.");
    c.declare_named_variable();
    c.consume(&TokenKind::RightParen, "Expect ')' after parameter name.");
}

/// Signature of a unary operator definition: just the name.
fn unary_signature(_c: &mut Compiler, signature: &mut Signature) {
    signature.sig_type = SignatureType::Getter;
}

/// Signature of an operator that can be unary or infix, like `-`.
fn mixed_signature(c: &mut Compiler, signature: &mut Signature) {
    signature.sig_type = SignatureType::Getter;

    // A parameter means it is the infix form.
    if c.match_token(&TokenKind::LeftParen) {
        signature.sig_type = SignatureType::Method;
        signature.arity = 1;

        c.declare_named_variable();
        c.consume(&TokenKind::RightParen, "Expect ')' after parameter name.");
    }
}

/// Signature of a subscript operator definition.
fn subscript_signature(c: &mut Compiler, signature: &mut Signature) {
    signature.sig_type = SignatureType::Subscript;
    // The name is currently "[", the token that matched; the subscript
    // signature has no name of its own.
    signature.name.clear();

    c.finish_parameter_list(signature);
    c.consume(&TokenKind::RightBracket, "Expect ']' after parameters.");

    c.maybe_setter(signature);
}

/// Signature of a named method, getter, or setter.
fn named_signature(c: &mut Compiler, signature: &mut Signature) {
    signature.sig_type = SignatureType::Getter;

    // A setter cannot also have a parameter list.
    if c.maybe_setter(signature) {
        return;
    }

    c.parameter_list(signature);
}

/// Signature of a constructor: `construct name(params)`.
fn constructor_signature(c: &mut Compiler, signature: &mut Signature) {
    c.consume(
        &TokenKind::Name(String::new()),
        "Expect constructor name after 'construct'.",
    );
    *signature = c.signature_from_token(SignatureType::Initializer);

    if c.match_token(&TokenKind::Eq) {
        c.error("A constructor cannot be a setter.");
    }

    if !c.match_token(&TokenKind::LeftParen) {
        c.error("A constructor cannot be a getter.");
        return;
    }
    if c.match_token(&TokenKind::RightParen) {
        return;
    }

    c.finish_parameter_list(signature);
    c.consume(&TokenKind::RightParen, "Expect ')' after parameters.");
}
