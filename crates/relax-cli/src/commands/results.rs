use crate::cli::ResultsArgs;
use crate::error::Result;
use nmr_relax::core::io::results::ResultsLine;
use nmr_relax::workflows::results;
use std::fmt::Write;

pub async fn run(args: ResultsArgs) -> Result<()> {
    let lines = results::read(&args.file)?;
    print!("{}", render(&lines));
    Ok(())
}

fn cell(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.4e}"))
}

/// A compact table of the value lines with their errors, when present.
fn render(lines: &[ResultsLine]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<6} {:<6} {:<9} {:<24} {:<24} {:<24}",
        "Num", "Name", "Selected", "J(0)", "J(wX)", "J(wH)"
    );
    let error_of = |line: &ResultsLine| {
        lines
            .iter()
            .find(|e| e.data_set == "error" && e.res_num == line.res_num && e.res_name == line.res_name)
    };
    for line in lines.iter().filter(|l| l.data_set == "value") {
        let error = error_of(line);
        let pair = |value: Option<f64>, err: Option<f64>| match err {
            Some(err) => format!("{} ± {}", cell(value), cell(Some(err))),
            None => cell(value),
        };
        let _ = writeln!(
            out,
            "{:<6} {:<6} {:<9} {:<24} {:<24} {:<24}",
            line.res_num.map_or_else(|| "-".to_string(), |n| n.to_string()),
            line.res_name.as_deref().unwrap_or("-"),
            if line.select { "yes" } else { "no" },
            pair(line.j0, error.and_then(|e| e.j0)),
            pair(line.jwx, error.and_then(|e| e.jwx)),
            pair(line.jwh, error.and_then(|e| e.jwh)),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(data_set: &str, res_num: i64, j0: Option<f64>) -> ResultsLine {
        ResultsLine {
            res_num: Some(res_num),
            res_name: Some("GLY".into()),
            select: true,
            data_set: data_set.into(),
            j0,
            ..ResultsLine::default()
        }
    }

    #[test]
    fn value_lines_are_paired_with_their_errors() {
        let lines = vec![
            line("value", 7, Some(4.5e-9)),
            line("value", 8, None),
            line("error", 7, Some(1.0e-10)),
            line("sim_0", 7, Some(4.4e-9)),
        ];
        let text = render(&lines);
        let rows: Vec<&str> = text.lines().collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[1].starts_with("7      GLY    yes"));
        assert!(rows[1].contains("4.5000e-9 ± 1.0000e-10"));
        assert!(rows[2].contains(" - "));
    }
}
