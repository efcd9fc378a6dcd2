use super::{Diagnostic, Severity};

pub fn render(d: &Diagnostic) -> String {
    let severity = match d.severity {
        Severity::Error => "error",
        Severity::Warning => "warning",
    };

    let mut obj = serde_json::json!({
        "severity": severity,
        "message": d.message,
        "notes": d.notes,
    });

    if let Some(code) = d.code {
        obj["code"] = serde_json::Value::String(code.to_string());
    }

    if let Some(loc) = d.location {
        obj["location"] = serde_json::json!({ "thread": loc.thread, "pc": loc.pc });
    }

    if let Some(s) = &d.suggestion {
        obj["suggestion"] = serde_json::Value::String(s.clone());
    }

    serde_json::to_string(&obj).unwrap_or_else(|_| r#"{"severity":"error","message":"internal error serializing diagnostic"}"#.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_json(s: &str) -> serde_json::Value {
        serde_json::from_str(s).expect("valid JSON")
    }

    #[test]
    fn render_basic_error() {
        let d = Diagnostic::error("type mismatch");
        let v = parse_json(&render(&d));
        assert_eq!(v["severity"], "error");
        assert_eq!(v["message"], "type mismatch");
        assert!(v["notes"].as_array().unwrap().is_empty());
    }

    #[test]
    fn render_with_code_and_location() {
        let d = Diagnostic::error("bad read").with_code("SVM-V002").with_location(0, 3);
        let v = parse_json(&render(&d));
        assert_eq!(v["code"], "SVM-V002");
        assert_eq!(v["location"]["thread"], 0);
        assert_eq!(v["location"]["pc"], 3);
    }

    #[test]
    fn render_optional_keys_absent() {
        let v = parse_json(&render(&Diagnostic::error("bad")));
        assert!(v.get("suggestion").is_none());
        assert!(v.get("code").is_none());
        assert!(v.get("location").is_none());
    }

    #[test]
    fn render_with_notes_and_suggestion() {
        let d = Diagnostic::error("bad")
            .with_note("first")
            .with_note("second")
            .with_suggestion("try this instead");
        let v = parse_json(&render(&d));
        let notes = v["notes"].as_array().unwrap();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0], "first");
        assert_eq!(v["suggestion"], "try this instead");
    }

    #[test]
    fn render_warning_severity() {
        let v = parse_json(&render(&Diagnostic::warning("still running")));
        assert_eq!(v["severity"], "warning");
    }
}
