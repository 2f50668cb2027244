//! Accepts either a bare signal number or one of the common BSD names,
//! the way `scancel -s` does.

pub fn parse_signal(input: &str) -> Result<i32, String> {
    if let Ok(n) = input.parse::<i32>() {
        return Ok(n);
    }
    let name = input.trim_start_matches("SIG").to_ascii_uppercase();
    match name.as_str() {
        "HUP" => Ok(1),
        "INT" => Ok(2),
        "QUIT" => Ok(3),
        "KILL" => Ok(9),
        "USR1" => Ok(10),
        "USR2" => Ok(12),
        "TERM" => Ok(15),
        "CONT" => Ok(18),
        "STOP" => Ok(19),
        _ => Err(format!("unknown signal {input:?}")),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[test]
    fn numeric_signal_passes_through() {
        assert_eq!(parse_signal("9"), Ok(9));
    }

    #[test]
    fn known_names_resolve() {
        assert_eq!(parse_signal("KILL"), Ok(9));
        assert_eq!(parse_signal("SIGTERM"), Ok(15));
        assert_eq!(parse_signal("term"), Ok(15));
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert!(parse_signal("NOTASIGNAL").is_err());
    }
}
