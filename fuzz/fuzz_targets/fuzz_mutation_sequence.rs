#![no_main]

use std::cell::Cell;
use std::rc::Rc;

use arbitrary::Arbitrary;
use deptrack::{
    Dep, Subscriber, Value, current_subscriber, delete_property, observe, set_property,
    with_active_subscriber,
};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
enum Op {
    Push(Vec<i16>),
    Pop,
    Shift,
    Unshift(Vec<i16>),
    Splice { start: u8, delete: u8, insert: Vec<i16> },
    Reverse,
    Sort,
    Truncate(u8),
    SetIndex(u8, i16),
    DeleteIndex(u8),
    SetKey(u8, i16),
    DeleteKey(u8),
}

#[derive(Default)]
struct Count(Cell<u64>);

impl Subscriber for Count {
    fn register_dependency(&self, _dep: &Rc<Dep>) {}
    fn notify_of_change(&self) {
        self.0.set(self.0.get() + 1);
    }
}

fn nums(raw: &[i16]) -> Vec<Value> {
    raw.iter().take(16).map(|n| Value::from(i32::from(*n))).collect()
}

fuzz_target!(|ops: Vec<Op>| {
    let state = Value::from(serde_json::json!({"items": [], "props": {}}));
    if observe(&state, false).is_none() {
        return;
    }
    let Some(root) = state.as_object().cloned() else {
        return;
    };
    let items = root.get("items");
    let props = root.get("props");
    let Some(arr) = items.as_array().cloned() else {
        return;
    };

    let counter = Rc::new(Count::default());
    let sub: Rc<dyn Subscriber> = counter.clone();
    with_active_subscriber(&sub, || root.get("items"));

    let mut expected = 0u64;
    for op in ops.iter().take(256) {
        match op {
            Op::Push(raw) => {
                arr.push(nums(raw));
            }
            Op::Pop => {
                arr.pop();
            }
            Op::Shift => {
                arr.shift();
            }
            Op::Unshift(raw) => {
                arr.unshift(nums(raw));
            }
            Op::Splice { start, delete, insert } => {
                arr.splice(usize::from(*start), usize::from(*delete), nums(insert));
            }
            Op::Reverse => arr.reverse(),
            Op::Sort => arr.sort_by(|a, b| {
                a.as_f64()
                    .unwrap_or_default()
                    .total_cmp(&b.as_f64().unwrap_or_default())
            }),
            Op::Truncate(len) => arr.truncate(usize::from(*len)),
            Op::SetIndex(idx, n) => {
                set_property(&items, usize::from(*idx % 32), Value::from(i32::from(*n)));
            }
            Op::DeleteIndex(idx) => delete_property(&items, usize::from(*idx)),
            Op::SetKey(key, n) => {
                set_property(&props, format!("k{}", key % 8), Value::from(i32::from(*n)));
                assert!(current_subscriber().is_none());
                continue;
            }
            Op::DeleteKey(key) => {
                delete_property(&props, format!("k{}", key % 8));
                continue;
            }
        }
        expected += 1;
    }

    assert_eq!(counter.0.get(), expected);
    assert!(current_subscriber().is_none());
});
