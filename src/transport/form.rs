use serde_json::Value;
use url::form_urlencoded::Serializer;

/// Encodes a JSON value as `application/x-www-form-urlencoded` using bracket
/// notation for nesting: `{"a":{"b":[1,2]}}` becomes `a[b][0]=1&a[b][1]=2`.
/// Nulls are dropped, booleans are written as `true`/`false`.
pub fn encode(value: &Value) -> String {
    let mut pairs = Vec::new();
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                flatten(k.clone(), v, &mut pairs);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten(i.to_string(), v, &mut pairs);
            }
        }
        _ => {}
    }

    let mut serializer = Serializer::new(String::new());
    for (k, v) in &pairs {
        serializer.append_pair(k, v);
    }
    serializer.finish()
}

fn flatten(prefix: String, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Null => {}
        Value::Bool(b) => out.push((prefix, b.to_string())),
        Value::Number(n) => out.push((prefix, n.to_string())),
        Value::String(s) => out.push((prefix, s.clone())),
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten(format!("{prefix}[{i}]"), v, out);
            }
        }
        Value::Object(map) => {
            for (k, v) in map {
                flatten(format!("{prefix}[{k}]"), v, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_values_use_bracket_notation() {
        let encoded = encode(&json!({
            "mode": "payment",
            "line_items": [{"price_data": {"unit_amount": 1050}, "quantity": 1}],
            "skip": null,
            "flag": true
        }));
        assert_eq!(
            encoded,
            "mode=payment&line_items%5B0%5D%5Bprice_data%5D%5Bunit_amount%5D=1050\
             &line_items%5B0%5D%5Bquantity%5D=1&flag=true"
        );
    }

    #[test]
    fn reserved_characters_are_escaped() {
        assert_eq!(
            encode(&json!({"url": "https://a.example/cb?x=1&y=2", "name": "A B"})),
            "url=https%3A%2F%2Fa.example%2Fcb%3Fx%3D1%26y%3D2&name=A+B"
        );
    }
}
