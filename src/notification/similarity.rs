//! 文本相似度 - 聚合器和偏好评分共用
//!
//! 使用 Dice 系数：`2 * |A ∩ B| / (|A| + |B|)`，A/B 为小写后按空白切分的 token 集合。
//! 与去重器的字符 n-gram 不同，这里比较的是整词，对 "Build #123 failed" 和
//! "Build #124 failed" 这类只差一个编号的告警能给出较高分数。

use std::collections::HashSet;

/// 计算两段文本的相似度，返回 0.0 - 1.0
pub fn text_similarity(a: &str, b: &str) -> f64 {
    let tokens_a = tokenize(a);
    let tokens_b = tokenize(b);

    if tokens_a.is_empty() && tokens_b.is_empty() {
        return 1.0;
    }
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let intersection = tokens_a.intersection(&tokens_b).count();
    (2 * intersection) as f64 / (tokens_a.len() + tokens_b.len()) as f64
}

fn tokenize(text: &str) -> HashSet<String> {
    text.split_whitespace().map(|t| t.to_lowercase()).collect()
}
