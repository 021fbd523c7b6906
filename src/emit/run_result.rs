use crate::runner::report::{EventReport, RunReport};

/// Emit run results as YAML.
pub fn emit_run_yaml(report: &RunReport) -> String {
    serde_yaml::to_string(report).unwrap_or_else(|e| format!("# Error serializing report: {e}"))
}

/// Emit run results as JSON.
pub fn emit_run_json(report: &RunReport) -> String {
    serde_json::to_string_pretty(report).unwrap_or_else(|e| format!("{{ \"error\": \"{}\" }}", e))
}

/// Emit run results as JUnit XML. Each spec event becomes a test case, and a
/// hook failure becomes a test case named after the hook. Deadlock events
/// become failing cases so CI surfaces them.
pub fn emit_run_junit(report: &RunReport) -> String {
    use std::fmt::Write;

    let mut out = String::new();
    let name = xml_escape(&report.suite.name);
    let cases: Vec<&EventReport> = report.events.iter().collect();
    let tests = cases.len();
    let failures = cases
        .iter()
        .filter(|e| matches!(e.kind.as_str(), "fail" | "hookFail" | "deadlock"))
        .count();
    let skipped = cases
        .iter()
        .filter(|e| matches!(e.kind.as_str(), "skip" | "dynamicSkip"))
        .count();
    let time_secs = report.suite.duration_ms as f64 / 1000.0;

    writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#).unwrap();
    writeln!(
        out,
        r#"<testsuites name="{name}" tests="{tests}" failures="{failures}" skipped="{skipped}" time="{time_secs:.1}">"#
    )
    .unwrap();
    writeln!(
        out,
        r#"  <testsuite name="{name}" tests="{tests}" failures="{failures}" skipped="{skipped}" time="{time_secs:.1}">"#
    )
    .unwrap();

    for event in cases {
        let case_name = match (&event.target, event.hook) {
            (Some(target), Some(hook)) => format!("{target}:{hook}"),
            (Some(target), None) => target.clone(),
            (None, _) => "dependencies".to_owned(),
        };
        let case_time = event.elapsed_ms.unwrap_or(0) as f64 / 1000.0;
        writeln!(
            out,
            r#"    <testcase name="{}" classname="{}" time="{case_time:.1}">"#,
            xml_escape(&case_name),
            xml_escape(&event.node)
        )
        .unwrap();

        let message = event.reason.as_deref().unwrap_or("");
        match event.kind.as_str() {
            "fail" | "hookFail" | "deadlock" => {
                writeln!(
                    out,
                    r#"      <failure message="{}" type="{}"/>"#,
                    xml_escape(message),
                    xml_escape(&event.kind)
                )
                .unwrap();
            }
            "skip" | "dynamicSkip" if message.is_empty() => {
                writeln!(out, r#"      <skipped/>"#).unwrap();
            }
            "skip" | "dynamicSkip" => {
                writeln!(out, r#"      <skipped message="{}"/>"#, xml_escape(message)).unwrap();
            }
            _ => {}
        }

        writeln!(out, "    </testcase>").unwrap();
    }

    if let Some(error) = &report.error
        && let Some(detail) = &error.detail
    {
        writeln!(out, "    <system-err>{}</system-err>", xml_escape(detail)).unwrap();
    }

    writeln!(out, "  </testsuite>").unwrap();
    writeln!(out, "</testsuites>").unwrap();

    out
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
