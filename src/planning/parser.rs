//! 编号列表提取
//!
//! 以「整数 + `.` 或 `)`」开头的行开始一个新条目，其后的非编号行拼接到当前条目；
//! 第一个编号行之前的内容丢弃。

const MAX_LABEL_CHARS: usize = 60;

/// 若该行是编号行，返回去掉编号后的正文
fn strip_number(line: &str) -> Option<&str> {
    let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    let rest = &line[digits..];
    rest.strip_prefix('.')
        .or_else(|| rest.strip_prefix(')'))
        .map(str::trim)
}

pub fn parse_numbered_list(text: &str) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    let mut current: Option<String> = None;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(body) = strip_number(line) {
            if let Some(done) = current.take() {
                items.push(done);
            }
            current = Some(body.to_string());
        } else if let Some(item) = current.as_mut() {
            if !item.is_empty() {
                item.push(' ');
            }
            item.push_str(line);
        }
    }
    items.extend(current);
    items.retain(|i| !i.is_empty());
    items
}

/// 从条目文本派生短标签：有冒号取冒号前部分，去掉 markdown 强调符号，过长截断
pub fn short_label(item: &str) -> String {
    let head = item.split_once(':').map(|(h, _)| h).unwrap_or(item);
    let head = head.trim().trim_matches(|c: char| c == '*' || c == '_' || c == '#').trim();
    let head = if head.is_empty() { item.trim() } else { head };
    if head.chars().count() > MAX_LABEL_CHARS {
        format!("{}...", head.chars().take(MAX_LABEL_CHARS).collect::<String>())
    } else {
        head.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbered_with_continuations() {
        let text = "Here is the plan:\n\n1. Design: outline\n   with details\n2) Build it\n10. Ship\n";
        let items = parse_numbered_list(text);
        assert_eq!(
            items,
            vec!["Design: outline with details", "Build it", "Ship"]
        );
    }

    #[test]
    fn test_no_numbered_lines() {
        assert!(parse_numbered_list("just prose\n- bullet").is_empty());
        assert!(parse_numbered_list("").is_empty());
    }

    #[test]
    fn test_number_without_delimiter_is_continuation() {
        let items = parse_numbered_list("1. Start\n2024 was a good year");
        assert_eq!(items, vec!["Start 2024 was a good year"]);
    }

    #[test]
    fn test_empty_numbered_line_takes_continuation() {
        let items = parse_numbered_list("1.\n   Gather data\n2. Report");
        assert_eq!(items, vec!["Gather data", "Report"]);
    }

    #[test]
    fn test_short_label() {
        assert_eq!(short_label("**Design**: outline the API"), "Design");
        assert_eq!(short_label("Write tests"), "Write tests");
        let long = "x".repeat(80);
        assert_eq!(short_label(&long).chars().count(), MAX_LABEL_CHARS + 3);
    }
}
