//! 日志预览格式化
//! 流式文本可能很长，日志里只输出折叠空白后的前若干字符

use std::fmt::{self, Write};

/// 按单词输出，单词间只保留一个空格，总长度超过 limit 个字符时截断并以 … 结尾
struct Preview<'a> {
    text: &'a str,
    limit: usize,
}

impl fmt::Display for Preview<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut budget = self.limit;
        for (i, word) in self.text.split_whitespace().enumerate() {
            if i > 0 {
                if budget == 0 {
                    return f.write_char('…');
                }
                f.write_char(' ')?;
                budget -= 1;
            }

            let len = word.chars().count();
            if len > budget {
                for ch in word.chars().take(budget) {
                    f.write_char(ch)?;
                }
                return f.write_char('…');
            }
            f.write_str(word)?;
            budget -= len;
        }
        Ok(())
    }
}

/// 日志里的文本预览，不分配内存
pub fn preview_compact(s: &str, max_len: usize) -> impl fmt::Display + '_ {
    Preview { text: s, limit: max_len }
}

/// 目标ID列表日志格式化
/// 格式：[id1, id2, ...] (total: N)
pub fn preview_ids(ids: &[String]) -> String {
    const MAX_COUNT: usize = 8;
    const MAX_ID_LEN: usize = 24;

    if ids.is_empty() {
        return "[empty]".to_string();
    }

    let mut result = String::with_capacity(MAX_COUNT * (MAX_ID_LEN + 2) + 20);
    result.push('[');
    for (idx, id) in ids.iter().take(MAX_COUNT).enumerate() {
        if idx > 0 {
            result.push_str(", ");
        }
        let _ = write!(result, "{}", preview_compact(id, MAX_ID_LEN));
    }
    if ids.len() > MAX_COUNT {
        let _ = write!(result, "… (total: {})", ids.len());
    }
    result.push(']');
    result
}
