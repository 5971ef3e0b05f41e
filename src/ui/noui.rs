//! 命令行交互：选收藏夹、确认画质模式、逐个分P选画质。

use std::io::{self, BufRead, Write};
use std::sync::OnceLock;

use anyhow::Result;
use regex::Regex;

use crate::download::models::{
    Collection, CollectionKind, Entry, QualityAsker, QualityOption, QualitySelection, SubPart,
};

static RE_ITEM: OnceLock<Regex> = OnceLock::new();

fn re_item() -> &'static Regex {
    RE_ITEM.get_or_init(|| {
        Regex::new(r"^\s*(\d+)\s*(?:[-~]\s*(\d+)\s*)?$").expect("compile RE_ITEM")
    })
}

pub fn print_collections(collections: &[Collection]) {
    println!("\n发现收藏夹:");
    for (idx, c) in collections.iter().enumerate() {
        let tag = match c.kind {
            CollectionKind::Created => "",
            CollectionKind::Collected => " [收藏]",
        };
        println!("  {}. {}{} ({}个视频)", idx + 1, c.title, tag, c.entry_count);
    }
}

/// 交互选择收藏夹；输入 q 返回 `None`。
pub fn select_collections(collections: &[Collection]) -> Result<Option<Vec<Collection>>> {
    print_collections(collections);
    loop {
        let input = read_line("\n请选择要下载的序号（多个用逗号分隔，如 1,3 或 2-4；q 退出）：")?;
        let text = input.trim();
        if text.eq_ignore_ascii_case("q") {
            return Ok(None);
        }
        match parse_indices(text, collections.len()) {
            Ok(picked) => {
                return Ok(Some(
                    picked.into_iter().map(|i| collections[i].clone()).collect(),
                ));
            }
            Err(msg) => println!("{msg}"),
        }
    }
}

/// 解析 1 起始的序号列表，返回去重后的 0 起始下标（保持输入顺序）。
pub fn parse_indices(text: &str, count: usize) -> std::result::Result<Vec<usize>, String> {
    if text.trim().is_empty() {
        return Err("输入为空，示例：1,3".to_string());
    }
    let mut out = Vec::new();
    for item in text.split([',', '，']) {
        let caps = re_item()
            .captures(item)
            .ok_or_else(|| format!("输入格式错误：{}，示例：1,3", item.trim()))?;
        let start: usize = caps[1]
            .parse()
            .map_err(|_| format!("序号过大：{}", &caps[1]))?;
        let end: usize = match caps.get(2) {
            Some(m) => m
                .as_str()
                .parse()
                .map_err(|_| format!("序号过大：{}", m.as_str()))?,
            None => start,
        };
        let (lo, hi) = if start <= end { (start, end) } else { (end, start) };
        if lo == 0 || hi > count {
            return Err(format!("请输入 1~{count} 之间的有效数字"));
        }
        for n in lo..=hi {
            if !out.contains(&(n - 1)) {
                out.push(n - 1);
            }
        }
    }
    Ok(out)
}

/// “是否全部以最高画质下载？(Y/n)”，空输入视为是。
pub fn ask_auto_quality() -> Result<bool> {
    let input = read_line("是否以最高画质下载所有视频？(Y/n)：")?;
    Ok(parse_yes_default(&input))
}

fn parse_yes_default(input: &str) -> bool {
    matches!(
        input.trim().to_ascii_lowercase().as_str(),
        "" | "y" | "yes"
    )
}

/// 手动模式下每个分P询问一次画质；读不到输入时使用最高画质。
pub fn quality_asker() -> QualityAsker {
    Box::new(|entry: &Entry, part: &SubPart, options: &[QualityOption]| {
        println!("\n{} - P{} {}", entry.title, part.part_index, part.title);
        println!("可用清晰度:");
        for (idx, opt) in options.iter().enumerate() {
            println!("  {}. {} - {}", idx + 1, opt.tier_code, opt.tier_label);
        }
        let default = options.first().map(|o| o.tier_code).unwrap_or_default();
        loop {
            let Ok(input) = read_line(&format!("请输入清晰度序号（默认 {default}）：")) else {
                return QualitySelection::Automatic;
            };
            match parse_quality_choice(&input, options.len()) {
                Ok(selection) => return selection,
                Err(msg) => println!("{msg}"),
            }
        }
    })
}

fn parse_quality_choice(input: &str, count: usize) -> std::result::Result<QualitySelection, String> {
    let text = input.trim();
    if text.is_empty() {
        return Ok(QualitySelection::Automatic);
    }
    match text.parse::<usize>() {
        Ok(n) if (1..=count).contains(&n) => Ok(QualitySelection::Manual(n - 1)),
        Ok(_) => Err(format!("请输入 1~{count} 之间的数字")),
        Err(_) => Err("输入无效，请输入数字".to_string()),
    }
}

fn read_line(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    io::stdout().flush().ok();
    let stdin = io::stdin();
    let mut line = String::new();
    let read = stdin.lock().read_line(&mut line)?;
    if read == 0 {
        anyhow::bail!("标准输入已关闭");
    }
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_accept_lists_and_ranges() {
        assert_eq!(parse_indices("1,3", 3).unwrap(), [0, 2]);
        assert_eq!(parse_indices(" 2 - 4 ，1", 5).unwrap(), [1, 2, 3, 0]);
        assert_eq!(parse_indices("3,3,2~3", 3).unwrap(), [2, 1]);
        assert_eq!(parse_indices("4-2", 4).unwrap(), [1, 2, 3]);
    }

    #[test]
    fn indices_reject_bad_input() {
        assert!(parse_indices("", 3).is_err());
        assert!(parse_indices("0", 3).is_err());
        assert!(parse_indices("4", 3).is_err());
        assert!(parse_indices("a,b", 3).is_err());
        assert!(parse_indices("1,,2", 3).is_err());
    }

    #[test]
    fn yes_is_default() {
        assert!(parse_yes_default("\n"));
        assert!(parse_yes_default("Y"));
        assert!(parse_yes_default(" yes "));
        assert!(!parse_yes_default("n"));
        assert!(!parse_yes_default("no"));
    }

    #[test]
    fn quality_choice_maps_to_selection() {
        assert_eq!(parse_quality_choice("", 3), Ok(QualitySelection::Automatic));
        assert_eq!(parse_quality_choice("2\n", 3), Ok(QualitySelection::Manual(1)));
        assert!(parse_quality_choice("4", 3).is_err());
        assert!(parse_quality_choice("x", 3).is_err());
    }
}
