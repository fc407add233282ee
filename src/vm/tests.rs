//! Behavior tests: whole programs run through the VM with captured output.

use std::cell::RefCell;
use std::rc::Rc;

use pretty_assertions::assert_eq;

use super::{InterpretResult, Vm, VmConfig};

struct Capture {
    output: Rc<RefCell<String>>,
    errors: Rc<RefCell<String>>,
}

fn capturing_vm(loader: Option<Box<dyn FnMut(&str) -> Option<String>>>) -> (Vm, Capture) {
    let output = Rc::new(RefCell::new(String::new()));
    let errors = Rc::new(RefCell::new(String::new()));

    let write_sink = output.clone();
    let error_sink = errors.clone();

    let config = VmConfig {
        write: Box::new(move |text| write_sink.borrow_mut().push_str(text)),
        error: Box::new(move |message| {
            let mut errors = error_sink.borrow_mut();
            errors.push_str(message);
            errors.push('\n');
        }),
        load_module: loader,
    };

    (Vm::with_config(config), Capture { output, errors })
}

fn run(source: &str) -> (InterpretResult, String, String) {
    let (mut vm, capture) = capturing_vm(None);
    let result = vm.interpret("main", source);
    let output = capture.output.borrow().clone();
    let errors = capture.errors.borrow().clone();
    (result, output, errors)
}

fn run_expect(source: &str, expected: &str) {
    let (result, output, errors) = run(source);
    assert_eq!(
        result,
        InterpretResult::Success,
        "program failed; errors: {}",
        errors
    );
    assert_eq!(output, expected);
}

fn run_expect_error(source: &str, needle: &str) {
    let (result, _output, errors) = run(source);
    assert_eq!(result, InterpretResult::RuntimeError);
    assert!(
        errors.contains(needle),
        "expected error containing {:?}, got: {}",
        needle,
        errors
    );
}

#[test]
fn test_print_sum_scenario() {
    run_expect("var a = 1\nvar b = 2\nIO.print(a + b)", "3\n");
}

#[test]
fn test_counter_class_scenario() {
    run_expect(
        "class Counter {\n  construct new() { _n = 0 }\n  inc() { _n = _n + 1 }\n  value { _n }\n}\nvar c = Counter.new()\nc.inc()\nc.inc()\nIO.print(c.value)",
        "2\n",
    );
}

#[test]
fn test_arithmetic_round_trip() {
    run_expect("IO.print((1.5 + 2.25) - 2.25)", "1.5\n");
    run_expect("IO.print(1 + 2 * 3)", "7\n");
    run_expect("IO.print((7 / 2).floor)", "3\n");
    run_expect("IO.print(10 % 3)", "1\n");
}

#[test]
fn test_number_formatting() {
    run_expect("IO.print(3)", "3\n");
    run_expect("IO.print(3.5)", "3.5\n");
    run_expect("IO.print(-0.25)", "-0.25\n");
    run_expect("IO.print(1e3)", "1000\n");
}

#[test]
fn test_string_operations() {
    run_expect("IO.print(\"he\" + \"llo\")", "hello\n");
    run_expect("IO.print(\"hello\".count)", "5\n");
    run_expect("IO.print(\"hello\"[1..3])", "ell\n");
    run_expect("IO.print(\"hello\".indexOf(\"llo\"))", "2\n");
    run_expect("IO.print(\"hello\".startsWith(\"he\"))", "true\n");
    run_expect("IO.print(\"abc\"[1])", "b\n");
}

#[test]
fn test_logical_operators_short_circuit() {
    run_expect("IO.print(false && Fiber.abort(\"no\"))", "false\n");
    run_expect("IO.print(true || Fiber.abort(\"no\"))", "true\n");
    run_expect("IO.print(null ? \"yes\" : \"no\")", "no\n");
}

#[test]
fn test_closure_identity_shared_upvalue() {
    // Two closures over the same local observe each other's writes, even
    // after the declaring call returns.
    run_expect(
        "var counter = null\nvar reader = null\nvar make = Fn.new {\n  var n = 10\n  counter = Fn.new { n = n + 1 }\n  reader = Fn.new { n }\n}\nmake.call()\ncounter.call()\ncounter.call()\nIO.print(reader.call())",
        "12\n",
    );
}

#[test]
fn test_upvalue_flattening_three_levels() {
    run_expect(
        "var result = null\nvar outer = Fn.new {\n  var x = 1\n  var middle = Fn.new {\n    var inner = Fn.new {\n      x = x + 41\n    }\n    inner.call()\n  }\n  middle.call()\n  result = x\n}\nouter.call()\nIO.print(result)",
        "42\n",
    );
}

#[test]
fn test_for_loop_captures_fresh_variable() {
    // Each iteration binds a fresh loop variable, so the closures see the
    // values they captured, not the final one.
    run_expect(
        "var fns = []\nfor (i in 1..3) {\n  fns.add(Fn.new { i })\n}\nfor (f in fns) {\n  IO.print(f.call())\n}",
        "1\n2\n3\n",
    );
}

#[test]
fn test_subclass_field_offsets() {
    run_expect(
        "class A {\n  construct new() { _a = 1 }\n  a { _a }\n}\nclass B is A {\n  construct new() {\n    super()\n    _b = 2\n  }\n  b { _b }\n}\nvar obj = B.new()\nIO.print(obj.a)\nIO.print(obj.b)",
        "1\n2\n",
    );
}

#[test]
fn test_unset_field_defaults_to_null() {
    run_expect(
        "class A {\n  construct new() { _a = 1 }\n}\nclass D is A {\n  construct new() { super() }\n  d { _d }\n}\nIO.print(D.new().d)",
        "null\n",
    );
}

#[test]
fn test_inherited_method_uses_superclass_fields() {
    // The inherited getter still reads A's slot even on a B instance whose
    // own field sits after it.
    run_expect(
        "class A {\n  construct new() { _a = \"from A\" }\n  a { _a }\n}\nclass B is A {\n  construct new() {\n    super()\n    _b = \"from B\"\n  }\n  b { _b }\n}\nvar obj = B.new()\nIO.print(obj.a)\nIO.print(obj.b)",
        "from A\nfrom B\n",
    );
}

#[test]
fn test_super_calls() {
    run_expect(
        "class Animal {\n  construct new(name) { _name = name }\n  speak() { IO.print(\"I am \" + _name) }\n}\nclass Dog is Animal {\n  construct new(name) { super(name) }\n  speak() {\n    super.speak()\n    IO.print(\"Woof\")\n  }\n}\nDog.new(\"Rex\").speak()",
        "I am Rex\nWoof\n",
    );
}

#[test]
fn test_super_resolves_statically_when_inherited() {
    // C inherits B's method containing a super call; the call must still hit
    // A (B's superclass), not B.
    run_expect(
        "class A {\n  name() { \"A\" }\n}\nclass B is A {\n  name() { \"B:\" + super.name() }\n}\nclass C is B {\n  construct new() {}\n}\nIO.print(C.new().name())",
        "B:A\n",
    );
}

#[test]
fn test_static_fields_and_methods() {
    run_expect(
        "class Counter {\n  static increment() {\n    __count = (__count == null) ? 1 : __count + 1\n    return __count\n  }\n}\nCounter.increment()\nCounter.increment()\nIO.print(Counter.increment())",
        "3\n",
    );
}

#[test]
fn test_operator_overloading() {
    run_expect(
        "class Vec {\n  construct new(x, y) {\n    _x = x\n    _y = y\n  }\n  x { _x }\n  y { _y }\n  +(other) { Vec.new(_x + other.x, _y + other.y) }\n  toString { \"(\" + _x.toString + \", \" + _y.toString + \")\" }\n}\nIO.print(Vec.new(1, 2) + Vec.new(3, 4))",
        "(4, 6)\n",
    );
}

#[test]
fn test_subscript_operator_definition() {
    run_expect(
        "class Grid {\n  construct new() { _cells = [0, 0, 0, 0] }\n  [i] { _cells[i] }\n  [i]=(value) { _cells[i] = value }\n}\nvar g = Grid.new()\ng[2] = 9\nIO.print(g[2])",
        "9\n",
    );
}

#[test]
fn test_getters_and_setters() {
    run_expect(
        "class Box {\n  construct new() { _value = 0 }\n  value { _value }\n  value=(v) { _value = v }\n}\nvar b = Box.new()\nb.value = 41\nb.value = b.value + 1\nIO.print(b.value)",
        "42\n",
    );
}

#[test]
fn test_is_operator() {
    run_expect("IO.print(1 is Num)", "true\n");
    run_expect("IO.print(\"s\" is String)", "true\n");
    run_expect("IO.print(\"s\" is Sequence)", "true\n");
    run_expect("IO.print(1 is String)", "false\n");
    run_expect(
        "class A {}\nclass B is A {}\nvar b = B\nIO.print(b is Class)",
        "true\n",
    );
}

#[test]
fn test_type_and_class_name() {
    run_expect("IO.print(1.type.name)", "Num\n");
    run_expect("IO.print(\"x\".type.supertype.name)", "Sequence\n");
}

#[test]
fn test_while_loop_and_break_discipline() {
    run_expect(
        "var i = 0\nwhile (i < 10) {\n  var a = i * 2\n  if (i >= 3) break\n  i = i + 1\n}\nIO.print(i)",
        "3\n",
    );

    // Breaking out of a nested block discards exactly the loop-body locals;
    // the module-level state stays coherent.
    run_expect(
        "var total = 0\nfor (x in 1..5) {\n  var doubled = x * 2\n  if (x > 3) {\n    var extra = 100\n    break\n  }\n  total = total + doubled\n}\nIO.print(total)",
        "12\n",
    );
}

#[test]
fn test_iterative_fibonacci() {
    run_expect(
        "var a = 0\nvar b = 1\nvar i = 0\nwhile (i < 10) {\n  var next = a + b\n  a = b\n  b = next\n  i = i + 1\n}\nIO.print(a)",
        "55\n",
    );
}

#[test]
fn test_recursive_fibonacci() {
    run_expect(
        "class Math {\n  static fib(n) {\n    if (n < 2) return n\n    return Math.fib(n - 1) + Math.fib(n - 2)\n  }\n}\nIO.print(Math.fib(15))",
        "610\n",
    );
}

#[test]
fn test_list_operations() {
    run_expect(
        "var list = [1, 2, 3]\nlist.add(4)\nIO.print(list)\nIO.print(list.count)",
        "[1, 2, 3, 4]\n4\n",
    );
    run_expect("IO.print([1, 2, 3][1..2])", "[2, 3]\n");
    run_expect("IO.print([1, 2, 3][0..-1])", "[1, 2, 3]\n");
    run_expect("IO.print([1, 2, 3][2..0])", "[3, 2, 1]\n");
    run_expect("var l = [1, 2]\nl[0] = 9\nIO.print(l)", "[9, 2]\n");
    run_expect(
        "var l = [1, 3]\nl.insert(1, 2)\nIO.print(l)\nIO.print(l.removeAt(0))\nIO.print(l)",
        "[1, 2, 3]\n1\n[2, 3]\n",
    );
}

#[test]
fn test_list_subscript_out_of_bounds() {
    run_expect_error("[1, 2][5]", "Subscript out of bounds.");
}

#[test]
fn test_map_operations() {
    run_expect(
        "var map = {\"a\": 1, \"b\": 2}\nIO.print(map[\"a\"] + map.count)\nIO.print(map[\"missing\"])\nIO.print(map.containsKey(\"b\"))",
        "3\nnull\ntrue\n",
    );
    run_expect(
        "var map = {\"a\": 1, \"b\": 2}\nmap.remove(\"a\")\nIO.print(map)",
        "{b: 2}\n",
    );
}

#[test]
fn test_range_iteration() {
    run_expect("for (x in 1..3) IO.print(x)", "1\n2\n3\n");
    run_expect("for (x in 1...3) IO.print(x)", "1\n2\n");
    run_expect("for (x in 3..1) IO.print(x)", "3\n2\n1\n");
    run_expect("IO.print((1..4).toList)", "[1, 2, 3, 4]\n");
}

#[test]
fn test_sequence_protocol() {
    run_expect("IO.print((1..3).map {|x| x * 2 }.toList)", "[2, 4, 6]\n");
    run_expect(
        "IO.print((1..10).where {|x| x % 3 == 0 }.toList)",
        "[3, 6, 9]\n",
    );
    run_expect("IO.print((1..4).reduce(0) {|acc, x| acc + x })", "10\n");
    run_expect("IO.print([\"a\", \"b\"].join(\"-\"))", "a-b\n");
    run_expect("IO.print([].isEmpty)", "true\n");
}

#[test]
fn test_fiber_try_returns_error_value() {
    run_expect(
        "var f = Fiber.new { Fiber.abort(\"x\") }\nIO.print(f.try())\nIO.print(f.error)\nIO.print(f.isDone)",
        "x\nx\ntrue\n",
    );
}

#[test]
fn test_uncaught_abort_is_runtime_error() {
    run_expect_error("Fiber.new { Fiber.abort(\"x\") }.call()", "x");
    run_expect_error("Fiber.abort(\"boom\")", "boom");
}

#[test]
fn test_fiber_yield_and_resume() {
    run_expect(
        "var fib = Fiber.new {\n  IO.print(1)\n  Fiber.yield()\n  IO.print(2)\n}\nfib.call()\nIO.print(\"between\")\nfib.call()",
        "1\nbetween\n2\n",
    );
}

#[test]
fn test_fiber_generator_yields_values() {
    run_expect(
        "var gen = Fiber.new {\n  Fiber.yield(1)\n  Fiber.yield(2)\n  return 3\n}\nIO.print(gen.call())\nIO.print(gen.call())\nIO.print(gen.call())\nIO.print(gen.isDone)",
        "1\n2\n3\ntrue\n",
    );
}

#[test]
fn test_fiber_call_passes_resume_value() {
    run_expect(
        "var echo = Fiber.new {\n  while (true) {\n    IO.print(Fiber.yield())\n  }\n}\necho.call()\necho.call(\"a\")\necho.call(\"b\")",
        "a\nb\n",
    );
}

#[test]
fn test_fiber_transfer_discards_switched_from_fiber() {
    run_expect(
        "var b = null\nvar a = Fiber.new {\n  IO.print(\"a\")\n  b.transfer()\n  IO.print(\"never\")\n}\nb = Fiber.new {\n  IO.print(\"b\")\n}\na.call()\nIO.print(\"done\")",
        "a\nb\ndone\n",
    );
}

#[test]
fn test_fiber_suspend_stops_interpretation() {
    run_expect(
        "IO.print(\"before\")\nFiber.suspend()\nIO.print(\"after\")",
        "before\n",
    );
}

#[test]
fn test_calling_finished_fiber_is_error() {
    run_expect_error(
        "var f = Fiber.new { 1 }\nf.call()\nf.call()",
        "Cannot call a finished fiber.",
    );
}

#[test]
fn test_method_not_found() {
    run_expect_error("(1).frob", "Num does not implement 'frob'.");
    run_expect_error(
        "class A { construct new() {} }\nA.new().missing(1, 2)",
        "A does not implement 'missing(_,_)'.",
    );
}

#[test]
fn test_inheriting_from_sealed_class_is_error() {
    run_expect_error(
        "class MyString is String {}",
        "cannot inherit from built-in class",
    );
}

#[test]
fn test_inheriting_from_non_class_is_error() {
    run_expect_error("var x = 1\nclass Bad is x {}", "non-class object");
}

#[test]
fn test_imports() {
    let loader: Box<dyn FnMut(&str) -> Option<String>> = Box::new(|name| {
        if name == "util" {
            Some("IO.print(\"loaded\")\nvar exported = 42".to_string())
        } else {
            None
        }
    });

    let (mut vm, capture) = capturing_vm(Some(loader));
    let result = vm.interpret(
        "main",
        "import \"util\" for exported\nIO.print(exported)\nimport \"util\"",
    );

    assert_eq!(result, InterpretResult::Success);
    // The module body runs once; re-importing is a no-op.
    assert_eq!(capture.output.borrow().as_str(), "loaded\n42\n");
}

#[test]
fn test_import_missing_module_is_error() {
    run_expect_error("import \"nowhere\"", "Could not find module 'nowhere'.");
}

#[test]
fn test_import_missing_variable_is_error() {
    let loader: Box<dyn FnMut(&str) -> Option<String>> =
        Box::new(|_| Some("var present = 1".to_string()));

    let (mut vm, capture) = capturing_vm(Some(loader));
    let result = vm.interpret("main", "import \"util\" for absent");

    assert_eq!(result, InterpretResult::RuntimeError);
    assert!(capture
        .errors
        .borrow()
        .contains("Could not find a variable named 'absent' in module 'util'."));
}

#[test]
fn test_compile_error_exit_code() {
    let (result, _output, errors) = run("var 1 = 2");
    assert_eq!(result, InterpretResult::CompileError);
    assert_eq!(result.exit_code(), 65);
    assert!(!errors.is_empty());
}

#[test]
fn test_runtime_error_exit_code() {
    let (result, _output, _errors) = run("Fiber.abort(\"x\")");
    assert_eq!(result.exit_code(), 70);
}

#[test]
fn test_success_exit_code() {
    let (result, _output, _errors) = run("1 + 1");
    assert_eq!(result.exit_code(), 0);
}

#[test]
fn test_block_arguments() {
    run_expect(
        "var result = []\n(1..3).each {|x| result.add(x * x) }\nIO.print(result)",
        "[1, 4, 9]\n",
    );
}

#[test]
fn test_fn_arity_check() {
    run_expect_error(
        "var f = Fn.new {|a, b| a + b }\nf.call(1)",
        "Function expects more arguments.",
    );
    run_expect("var f = Fn.new {|a, b| a + b }\nIO.print(f.call(1, 2))", "3\n");
}

#[test]
fn test_classes_inside_functions() {
    // A class defined in a local scope lives in a local slot.
    run_expect(
        "var make = Fn.new {\n  class Point {\n    construct new(x) { _x = x }\n    x { _x }\n  }\n  return Point.new(7)\n}\nIO.print(make.call().x)",
        "7\n",
    );
}

#[test]
fn test_repl_style_module_reuse() {
    // Interpreting twice into "main" shares module variables, as the REPL
    // relies on.
    let (mut vm, capture) = capturing_vm(None);
    assert_eq!(vm.interpret("repl", "var a = 40"), InterpretResult::Success);
    assert_eq!(vm.interpret("repl", "IO.print(a + 2)"), InterpretResult::Success);
    assert_eq!(capture.output.borrow().as_str(), "42\n");
}

#[test]
fn test_object_equality_and_same() {
    run_expect("IO.print(1 == 1.0)", "true\n");
    run_expect("IO.print(\"a\" == \"a\")", "true\n");
    run_expect("IO.print([] == [])", "false\n");
    run_expect("var l = []\nIO.print(l == l)", "true\n");
    run_expect("IO.print(Object.same(1, 1))", "true\n");
}

#[test]
fn test_bitwise_operators() {
    run_expect("IO.print(6 & 3)", "2\n");
    run_expect("IO.print(6 | 3)", "7\n");
    run_expect("IO.print(6 ^ 3)", "5\n");
    run_expect("IO.print(1 << 4)", "16\n");
    run_expect("IO.print(16 >> 4)", "1\n");
}

#[test]
fn test_ternary_and_nested_conditionals() {
    run_expect("IO.print(1 < 2 ? \"a\" : \"b\")", "a\n");
    run_expect("IO.print(false ? 1 : true ? 2 : 3)", "2\n");
}

#[test]
fn test_multiple_vms_are_independent() {
    let (mut first, first_capture) = capturing_vm(None);
    let (mut second, second_capture) = capturing_vm(None);

    assert_eq!(
        first.interpret("main", "var x = 1\nIO.print(x)"),
        InterpretResult::Success
    );
    assert_eq!(
        second.interpret("main", "var x = 2\nIO.print(x)"),
        InterpretResult::Success
    );

    assert_eq!(first_capture.output.borrow().as_str(), "1\n");
    assert_eq!(second_capture.output.borrow().as_str(), "2\n");
}
