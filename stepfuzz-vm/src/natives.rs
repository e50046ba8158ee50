use crate::error::Bailout;
use crate::value::Value;
use crate::vm::Vm;
use std::fmt;
use std::rc::Rc;

pub type NativeHandler = dyn Fn(&mut Vm, &[Value]) -> Result<Value, Bailout>;

/// A built-in function implemented in Rust.
pub struct NativeFunction {
    name: Rc<str>,
    min_args: usize,
    max_args: Option<usize>,
    handler: Rc<NativeHandler>,
}

impl NativeFunction {
    pub fn new<F>(name: &str, min_args: usize, max_args: Option<usize>, handler: F) -> Self
    where
        F: Fn(&mut Vm, &[Value]) -> Result<Value, Bailout> + 'static,
    {
        NativeFunction {
            name: name.into(),
            min_args,
            max_args,
            handler: Rc::new(handler),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn accepts(&self, argc: usize) -> bool {
        argc >= self.min_args && self.max_args.map_or(true, |max| argc <= max)
    }

    /// Run the function body, skipping arity checks.
    pub fn call(&self, vm: &mut Vm, args: &[Value]) -> Result<Value, Bailout> {
        (self.handler)(vm, args)
    }

    fn arity(&self) -> String {
        match self.max_args {
            Some(max) if max == self.min_args => format!("exactly {}", max),
            Some(max) => format!("between {} and {}", self.min_args, max),
            None => format!("at least {}", self.min_args),
        }
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}

/// A native call with its arguments bound, as seen by a [`NativeInvoker`](../hooks/trait.NativeInvoker.html).
#[derive(Debug)]
pub struct NativeCall {
    pub function: Rc<NativeFunction>,
    pub args: Vec<Value>,
}

impl NativeCall {
    pub fn string_args(&self) -> impl Iterator<Item = &str> {
        self.args.iter().filter_map(Value::as_str)
    }
}

/// The interpreter's own native-call path: check arity, then run the body.
pub fn execute_internal(vm: &mut Vm, call: &NativeCall) -> Result<Value, Bailout> {
    let function = &call.function;
    if !function.accepts(call.args.len()) {
        vm.throw_error(format!(
            "{}() expects {} arguments, {} given",
            function.name,
            function.arity(),
            call.args.len()
        ));
        return Ok(Value::Null);
    }
    function.call(vm, &call.args)
}

/// The built-in function table.
pub fn stdlib() -> Vec<NativeFunction> {
    vec![
        NativeFunction::new("strlen", 1, Some(1), |_vm, args| {
            Ok(Value::Int(args[0].to_display_string().len() as i64))
        }),
        NativeFunction::new("str_repeat", 2, Some(2), str_repeat),
        NativeFunction::new("substr", 2, Some(3), substr),
        NativeFunction::new("strtoupper", 1, Some(1), |_vm, args| {
            Ok(Value::string(args[0].to_display_string().to_ascii_uppercase()))
        }),
        NativeFunction::new("strtolower", 1, Some(1), |_vm, args| {
            Ok(Value::string(args[0].to_display_string().to_ascii_lowercase()))
        }),
        NativeFunction::new("strrev", 1, Some(1), |_vm, args| {
            Ok(Value::string(
                args[0].to_display_string().chars().rev().collect::<String>(),
            ))
        }),
        NativeFunction::new("str_replace", 3, Some(3), str_replace),
        NativeFunction::new("intval", 1, Some(1), |_vm, args| {
            Ok(Value::Int(args[0].to_int()))
        }),
        NativeFunction::new("gettype", 1, Some(1), |_vm, args| {
            Ok(Value::string(args[0].type_name()))
        }),
        NativeFunction::new("call", 1, None, |vm, args| {
            let name = args[0].to_display_string();
            vm.call_user_function(&name, args[1..].to_vec())
        }),
    ]
}

fn str_repeat(vm: &mut Vm, args: &[Value]) -> Result<Value, Bailout> {
    let s = args[0].to_display_string();
    let times = args[1].to_int();
    if times < 0 {
        vm.throw_error("str_repeat(): Argument #2 ($times) must be greater than or equal to 0");
        return Ok(Value::Null);
    }
    let len = s.len().checked_mul(times as usize).unwrap_or(usize::MAX);
    vm.check_alloc(len)?;
    Ok(Value::string(s.repeat(times as usize)))
}

fn substr(_vm: &mut Vm, args: &[Value]) -> Result<Value, Bailout> {
    let s = args[0].to_display_string();
    let bytes = s.as_bytes();
    let n = bytes.len() as i64;
    let mut start = args[1].to_int();
    if start < 0 {
        start = (n + start).max(0);
    }
    if start > n {
        return Ok(Value::string(""));
    }
    let avail = n - start;
    let len = match args.get(2) {
        None | Some(Value::Null) => avail,
        Some(v) => {
            let l = v.to_int();
            if l < 0 {
                (avail + l).max(0)
            } else {
                l.min(avail)
            }
        }
    };
    let slice = &bytes[start as usize..(start + len) as usize];
    Ok(Value::string(String::from_utf8_lossy(slice).into_owned()))
}

fn str_replace(vm: &mut Vm, args: &[Value]) -> Result<Value, Bailout> {
    let search = args[0].to_display_string();
    let replace = args[1].to_display_string();
    let subject = args[2].to_display_string();
    if search.is_empty() {
        return Ok(Value::string(subject));
    }
    let hits = subject.matches(search.as_str()).count();
    let len = (subject.len() - hits * search.len())
        .checked_add(hits.checked_mul(replace.len()).unwrap_or(usize::MAX))
        .unwrap_or(usize::MAX);
    vm.check_alloc(len)?;
    Ok(Value::string(subject.replace(search.as_str(), &replace)))
}
