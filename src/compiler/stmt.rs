//! Statements, definitions, loops and class compilation.

use crate::bytecode::Op;
use crate::lexer::TokenKind;

use super::grammar::{rule, Precedence};
use super::signature::{Signature, SignatureType};
use super::{ClassInfo, Compiler, MAX_FIELDS};

impl Compiler<'_> {
    /// Compile a "definition": statements that bind new variables. Only
    /// allowed at the top level of a block, never as the single-statement
    /// body of an `if` or loop.
    pub(super) fn definition(&mut self) {
        if self.match_token(&TokenKind::Class) {
            self.class_definition();
            return;
        }
        if self.match_token(&TokenKind::Import) {
            self.import();
            return;
        }
        if self.match_token(&TokenKind::Var) {
            self.variable_definition();
            return;
        }
        self.block();
    }

    /// Compile a curly block or a single statement, as in the arms of an
    /// `if`.
    pub(super) fn block(&mut self) {
        if self.match_token(&TokenKind::LeftBrace) {
            self.push_scope();
            if self.finish_block() {
                // The block was an expression, so discard its value.
                self.emit_op(Op::Pop);
            }
            self.pop_scope();
            return;
        }
        self.statement();
    }

    /// Parse a block body after the opening `{`. Returns true if the block
    /// was a single expression whose value is left on the stack.
    pub(super) fn finish_block(&mut self) -> bool {
        // Empty blocks do nothing.
        if self.match_token(&TokenKind::RightBrace) {
            return false;
        }

        // No newline after the "{" means a single-expression body.
        if !self.match_line() {
            self.expression();
            self.consume(&TokenKind::RightBrace, "Expect '}' at end of block.");
            return true;
        }

        // A block with just a newline inside also does nothing.
        if self.match_token(&TokenKind::RightBrace) {
            return false;
        }

        loop {
            self.definition();

            // Don't get stuck in a loop if we hit a weird error state.
            if self.check(&TokenKind::Eof) {
                return true;
            }

            self.consume_line("Expect newline after statement.");
            if self.match_token(&TokenKind::RightBrace) {
                break;
            }
        }
        false
    }

    /// Parse a method or function body after the opening `{`. Initializers
    /// discard any body value and return the receiver; other bodies
    /// implicitly return null when they are statement bodies.
    pub(super) fn finish_body(&mut self, is_initializer: bool) {
        let is_expression_body = self.finish_block();

        if is_initializer {
            if is_expression_body {
                self.emit_op(Op::Pop);
            }
            // The receiver is always in the first local slot.
            self.emit_op(Op::LoadLocal0);
        } else if !is_expression_body {
            self.emit_op(Op::Null);
        }
        self.emit_op(Op::Return);
    }

    /// Compile a statement. Unlike expressions, these leave no value on the
    /// stack.
    fn statement(&mut self) {
        if self.match_token(&TokenKind::Break) {
            if self.current_fn().loops.is_empty() {
                self.error("Cannot use 'break' outside of a loop.");
                return;
            }

            // Locals of the scopes being jumped out of are still in scope
            // past the break, so discard them without undeclaring.
            let depth = self
                .current_fn()
                .loops
                .last()
                .map(|l| l.scope_depth)
                .unwrap_or(0);
            self.discard_locals(depth + 1);

            // A placeholder for the jump to the loop end: the reserved `End`
            // opcode, which cannot occur in the middle of real bytecode.
            // `end_loop` rewrites it into a jump once the end is known.
            self.emit_jump(Op::End);
            return;
        }

        if self.match_token(&TokenKind::For) {
            self.for_statement();
            return;
        }

        if self.match_token(&TokenKind::If) {
            self.consume(&TokenKind::LeftParen, "Expect '(' after 'if'.");
            self.expression();
            self.consume(&TokenKind::RightParen, "Expect ')' after if condition.");

            let if_jump = self.emit_jump(Op::JumpIf);

            self.block();

            if self.match_token(&TokenKind::Else) {
                let else_jump = self.emit_jump(Op::Jump);
                self.patch_jump(if_jump);

                self.block();
                self.patch_jump(else_jump);
            } else {
                self.patch_jump(if_jump);
            }
            return;
        }

        if self.match_token(&TokenKind::Return) {
            if self.check(&TokenKind::Line) {
                // No value; implicitly return null.
                self.emit_op(Op::Null);
            } else {
                self.expression();
            }
            self.emit_op(Op::Return);
            return;
        }

        if self.match_token(&TokenKind::While) {
            self.while_statement();
            return;
        }

        // Expression statement.
        self.expression();
        self.emit_op(Op::Pop);
    }

    fn while_statement(&mut self) {
        self.start_loop();

        self.consume(&TokenKind::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(&TokenKind::RightParen, "Expect ')' after while condition.");

        self.test_exit_loop();
        self.loop_body();
        self.end_loop();
    }

    /// A for statement:
    ///
    /// ```text
    ///     for (i in sequence.expression) { body }
    /// ```
    ///
    /// compiles as if it were:
    ///
    /// ```text
    ///     {
    ///       var seq_ = sequence.expression
    ///       var iter_
    ///       while (iter_ = seq_.iterate(iter_)) {
    ///         var i = seq_.iteratorValue(iter_)
    ///         body
    ///       }
    ///     }
    /// ```
    ///
    /// The sequence is evaluated once; `iterate(_)` advances the iterator
    /// and decides when to exit; `iteratorValue(_)` produces the element.
    /// The loop variable is bound in its own per-iteration scope, so
    /// closures over it each capture a fresh variable.
    fn for_statement(&mut self) {
        // A scope for the hidden iterator locals.
        self.push_scope();

        self.consume(&TokenKind::LeftParen, "Expect '(' after 'for'.");
        let name = self.consume_name("Expect for loop variable name.");
        self.consume(&TokenKind::In, "Expect 'in' after loop variable.");
        self.ignore_newlines();

        // Evaluate the sequence and stash it in a hidden local. The space in
        // the name keeps it from ever colliding with a user variable.
        self.expression();
        let seq_slot = self.define_local("seq ");

        self.emit_op(Op::Null);
        let iter_slot = self.define_local("iter ");

        self.consume(&TokenKind::RightParen, "Expect ')' after loop expression.");

        self.start_loop();

        // Advance the iterator and store it for the next iteration.
        self.load_local(seq_slot);
        self.load_local(iter_slot);
        self.call_method(1, "iterate(_)");
        self.emit_byte_arg(Op::StoreLocal, iter_slot as u8);

        self.test_exit_loop();

        // Fetch the element at the current iterator position.
        self.load_local(seq_slot);
        self.load_local(iter_slot);
        self.call_method(1, "iteratorValue(_)");

        self.push_scope();
        self.define_local(name);

        self.loop_body();

        // The per-iteration loop variable.
        self.pop_scope();

        self.end_loop();

        // The hidden locals.
        self.pop_scope();
    }

    /// Compile a class definition; the `class` token is already consumed.
    fn class_definition(&mut self) {
        // A variable to store the class in.
        let class_slot = self.declare_named_variable();
        let class_name = match &self.previous.kind {
            TokenKind::Name(name) => name.clone(),
            _ => String::new(),
        };

        let name_constant = self.string_constant(&class_name);
        self.emit_short_arg(Op::Constant, name_constant);

        // The superclass, or implicitly Object.
        if self.match_token(&TokenKind::Is) {
            self.parse_precedence(false, Precedence::Call);
        } else {
            self.load_core_variable("Object");
        }

        // The field count is unknown until every method body has been
        // compiled, so emit a placeholder and patch it below.
        let num_fields_offset = self.emit_byte_arg(Op::Class, u8::MAX);

        self.define_variable(class_slot);

        // Static fields in the class body are hoisted into locals of this
        // scope; methods that use them get upvalues referencing them.
        self.push_scope();

        let saved_class_info = self.current_fn().class_info.replace(ClassInfo {
            fields: Vec::new(),
            is_static_method: false,
            signature: None,
        });

        self.consume(&TokenKind::LeftBrace, "Expect '{' after class declaration.");
        self.match_line();

        while !self.match_token(&TokenKind::RightBrace) {
            if !self.method(class_slot) {
                break;
            }

            // The newline is not required after the last definition.
            if self.match_token(&TokenKind::RightBrace) {
                break;
            }
            self.consume_line("Expect newline after definition in class.");
        }

        let num_fields = self
            .current_fn()
            .class_info
            .as_ref()
            .map(|info| info.fields.len())
            .unwrap_or(0);
        self.current_fn().bytecode[num_fields_offset] = num_fields.min(MAX_FIELDS) as u8;

        self.current_fn().class_info = saved_class_info;
        self.pop_scope();
    }

    /// Compile one method definition inside a class body. Returns false when
    /// no method could be parsed.
    fn method(&mut self, class_slot: usize) -> bool {
        let is_static = self.match_token(&TokenKind::Static);

        let signature_fn = rule(&self.current.kind).method;
        self.next_token();

        let Some(signature_fn) = signature_fn else {
            self.error("Expect method definition.");
            return false;
        };

        let mut signature = self.signature_from_token(SignatureType::Getter);
        if let Some(class_fn) = self.enclosing_class_index() {
            if let Some(info) = self.fns[class_fn].class_info.as_mut() {
                info.is_static_method = is_static;
            }
        }

        self.push_fn_compiler(true);
        signature_fn(self, &mut signature);
        self.current_fn().num_params = signature.arity;

        if is_static && signature.sig_type == SignatureType::Initializer {
            self.error("A constructor cannot be static.");
        }

        // Record the completed signature so unnamed `super` calls in the
        // body can reuse it.
        if let Some(class_fn) = self.enclosing_class_index() {
            if let Some(info) = self.fns[class_fn].class_info.as_mut() {
                info.signature = Some(signature.clone());
            }
        }

        let full_signature = signature.to_string();

        self.consume(&TokenKind::LeftBrace, "Expect '{' to begin method body.");
        self.finish_body(signature.sig_type == SignatureType::Initializer);
        self.end_compiler(full_signature.clone());

        // For a constructor, this defines the instance initializer method.
        let method_symbol = self.method_symbol(&full_signature);
        self.define_method(class_slot, is_static, method_symbol);

        if signature.sig_type == SignatureType::Initializer {
            // Also define the metaclass constructor that allocates the
            // instance and chains into the initializer.
            let mut constructor = signature.clone();
            constructor.sig_type = SignatureType::Method;
            let constructor_symbol = self.signature_symbol(&constructor);

            self.create_constructor(&constructor, method_symbol);
            self.define_method(class_slot, true, constructor_symbol);
        }

        true
    }

    /// Synthesize the metaclass constructor: allocate the instance, then
    /// invoke the initializer on it with the same arguments.
    fn create_constructor(&mut self, signature: &Signature, initializer_symbol: usize) {
        self.push_fn_compiler(true);
        self.current_fn().num_params = signature.arity;

        self.emit_op(Op::Construct);
        self.emit_short_arg(Op::call(signature.arity), initializer_symbol as u16);
        self.emit_op(Op::Return);

        self.end_compiler("");
    }

    /// Emit the code binding the just-compiled method to the class stored in
    /// `class_slot`.
    fn define_method(&mut self, class_slot: usize, is_static: bool, method_symbol: usize) {
        if self.scope_depth() == 0 {
            // A module-level class; the class is in a module variable.
            self.emit_short_arg(Op::LoadModuleVar, class_slot as u16);
        } else {
            self.load_local(class_slot);
        }

        let op = if is_static {
            Op::MethodStatic
        } else {
            Op::MethodInstance
        };
        self.emit_short_arg(op, method_symbol as u16);
    }

    fn import(&mut self) {
        self.consume(&TokenKind::Str(String::new()), "Expect a string after 'import'.");
        let module_name = match &self.previous.kind {
            TokenKind::Str(name) => name.clone(),
            _ => String::new(),
        };
        let module_constant = self.string_constant(&module_name);

        // Load the module and discard the unused result of the fiber that
        // ran its body.
        self.emit_short_arg(Op::LoadModule, module_constant);
        self.emit_op(Op::Pop);

        // The `for` clause is optional.
        if !self.match_token(&TokenKind::For) {
            return;
        }

        loop {
            let slot = self.declare_named_variable();
            let variable_name = match &self.previous.kind {
                TokenKind::Name(name) => name.clone(),
                _ => String::new(),
            };
            let variable_constant = self.string_constant(&variable_name);

            self.emit_short_arg(Op::ImportVariable, module_constant);
            self.emit_short(variable_constant);
            self.define_variable(slot);

            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
    }

    fn variable_definition(&mut self) {
        // Grab the name but don't declare it yet; a local variable is not in
        // scope in its own initializer.
        self.consume(&TokenKind::Name(String::new()), "Expect variable name.");
        let name_token = self.previous.clone();

        if self.match_token(&TokenKind::Eq) {
            self.expression();
        } else {
            self.emit_op(Op::Null);
        }

        let symbol = self.declare_variable(Some(name_token));
        self.define_variable(symbol);
    }
}
