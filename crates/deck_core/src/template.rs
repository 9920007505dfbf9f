use serde_json::{Number, Value};

pub const PLACEHOLDER: &str = "{value}";

/// Replaces every `{value}` in `template` with the display form of `value`.
pub fn render(template: &str, value: &Value) -> String {
    template.replace(PLACEHOLDER, &display_value(value))
}

/// Containers render as compact JSON, scalars as plain text.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => display_number(number),
        Value::String(text) => text.clone(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn display_number(number: &Number) -> String {
    match number.as_f64() {
        Some(float) if number.is_f64() && float.fract() == 0.0 && float.abs() < 1e15 => {
            format!("{}", float as i64)
        }
        _ => number.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substitutes_scalars() {
        assert_eq!(render("Temp: {value}C", &json!(60)), "Temp: 60C");
        assert_eq!(render("{value}", &json!("printing")), "printing");
        assert_eq!(render("on={value}", &json!(true)), "on=true");
        assert_eq!(render("{value}", &Value::Null), "null");
        assert_eq!(render("{value}%", &json!(42.75)), "42.75%");
    }

    #[test]
    fn integral_floats_drop_the_fraction() {
        assert_eq!(render("{value}", &json!(60.0)), "60");
        assert_eq!(render("{value}", &json!(-3.0)), "-3");
    }

    #[test]
    fn containers_render_as_json() {
        assert_eq!(render("Temp: {value}C", &json!({"x": 1})), "Temp: {\"x\":1}C");
        assert_eq!(render("{value}", &json!([1, "a", null])), "[1,\"a\",null]");
    }

    #[test]
    fn replaces_every_occurrence_and_tolerates_none() {
        assert_eq!(render("{value}/{value}", &json!(3)), "3/3");
        assert_eq!(render("static", &json!(3)), "static");
        assert_eq!(render("", &json!(3)), "");
    }
}
