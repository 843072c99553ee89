use crate::runtime::member::property_key;
use crate::runtime::value::Value;
use crate::types::registry::{arg, TypeDesc};

pub fn object_desc() -> TypeDesc {
    TypeDesc::new("object")
        .method("keys", |this, _, _| {
            let Value::Object(o) = this else { return Ok(Value::Null) };
            Ok(Value::array(o.props.read().keys().cloned().map(Value::String).collect()))
        })
        .method("values", |this, _, _| {
            let Value::Object(o) = this else { return Ok(Value::Null) };
            Ok(Value::array(o.props.read().values().cloned().collect()))
        })
        .method("has", |this, args, _| {
            let Value::Object(o) = this else { return Ok(Value::Boolean(false)) };
            Ok(Value::Boolean(o.props.read().contains_key(&property_key(arg(args, 0)))))
        })
        .method("delete", |this, args, _| {
            let Value::Object(o) = this else { return Ok(Value::Boolean(false)) };
            Ok(Value::Boolean(o.props.write().shift_remove(&property_key(arg(args, 0))).is_some()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::value::NativeFn;
    use crate::syntax::cst::Span;
    use crate::types::registry::{Lookup, TYPES};
    use indexmap::IndexMap;

    fn call(this: &Value, name: &str, args: &[Value]) -> Value {
        let Some(Lookup::Method(_, NativeFn::Pure(f))) = TYPES.lookup(this, name) else { panic!() };
        f(this, args, Span::default()).unwrap()
    }

    #[test]
    fn keys_values_in_insertion_order() {
        let mut props = IndexMap::new();
        props.insert("b".to_string(), Value::Number(2.0));
        props.insert("a".to_string(), Value::Number(1.0));
        let o = Value::object(props);
        assert_eq!(call(&o, "keys", &[]).stringify(), "b,a");
        assert_eq!(call(&o, "values", &[]).stringify(), "2,1");
    }

    #[test]
    fn has_and_delete() {
        let o = Value::object(IndexMap::new());
        let Value::Object(inner) = &o else { panic!() };
        inner.set("k", Value::Null);
        assert!(call(&o, "has", &[Value::string("k")]).truthy());
        assert!(call(&o, "delete", &[Value::string("k")]).truthy());
        assert!(!call(&o, "has", &[Value::string("k")]).truthy());
        assert!(!call(&o, "delete", &[Value::string("k")]).truthy());
    }
}
