//! End-to-end benchmarks: compile and run small programs through the VM.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use wisplang::{InterpretResult, Vm, VmConfig};

/// A VM whose output goes nowhere, so printing does not dominate timings.
fn quiet_vm() -> Vm {
    Vm::with_config(VmConfig {
        write: Box::new(|_| {}),
        error: Box::new(|message| panic!("benchmark program failed: {}", message)),
        load_module: None,
    })
}

fn run(source: &str) {
    let mut vm = quiet_vm();
    assert_eq!(vm.interpret("main", source), InterpretResult::Success);
}

const FIB_RECURSIVE: &str = "
class Math {
  static fib(n) {
    if (n < 2) return n
    return Math.fib(n - 1) + Math.fib(n - 2)
  }
}
IO.print(Math.fib(18))
";

const LOOP_SUM: &str = "
var total = 0
var i = 0
while (i < 100000) {
  total = total + i
  i = i + 1
}
IO.print(total)
";

const LIST_BUILD: &str = "
var list = []
for (i in 1..10000) {
  list.add(i * 2)
}
IO.print(list.count)
";

const CLOSURE_CHURN: &str = "
var total = 0
for (i in 1..1000) {
  var f = Fn.new { i * 2 }
  total = total + f.call()
}
IO.print(total)
";

const FIBER_SWITCH: &str = "
var gen = Fiber.new {
  while (true) Fiber.yield(1)
}
var total = 0
var i = 0
while (i < 10000) {
  total = total + gen.call()
  i = i + 1
}
IO.print(total)
";

fn compile_only(c: &mut Criterion) {
    c.bench_function("compile_fib", |b| {
        b.iter(|| {
            let mut vm = quiet_vm();
            let func = vm.compile_module("main", black_box(FIB_RECURSIVE));
            assert!(func.is_some());
        })
    });
}

fn interpret_programs(c: &mut Criterion) {
    let mut group = c.benchmark_group("interpret");
    group.bench_function("fib_recursive", |b| b.iter(|| run(black_box(FIB_RECURSIVE))));
    group.bench_function("loop_sum", |b| b.iter(|| run(black_box(LOOP_SUM))));
    group.bench_function("list_build", |b| b.iter(|| run(black_box(LIST_BUILD))));
    group.bench_function("closure_churn", |b| b.iter(|| run(black_box(CLOSURE_CHURN))));
    group.bench_function("fiber_switch", |b| b.iter(|| run(black_box(FIBER_SWITCH))));
    group.finish();
}

criterion_group!(benches, compile_only, interpret_programs);
criterion_main!(benches);
