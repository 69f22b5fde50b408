//! 检索策略选择

use crate::models::search::RetrievalStrategy;

/// 超过这个字符数的查询交给 AI 转换
pub const COMPLEX_QUERY_LENGTH: usize = 50;

const BOOLEAN_OPERATORS: [&str; 2] = ["AND", "OR"];
const ANALYTIC_KEYWORDS: [&str; 4] = ["统计", "聚合", "分析", "对比"];
const ANALYTIC_KEYWORDS_EN: [&str; 5] = ["statistics", "aggregate", "analyze", "analyse", "compare"];
const SEMANTIC_KEYWORDS: [&str; 7] = ["相似", "类似", "相关", "相近", "如何", "什么", "为什么"];
const SEMANTIC_WORDS_EN: [&str; 5] = ["similar", "related", "how", "what", "why"];

/// 根据查询文本选择策略，纯函数
///
/// 复杂查询优先于语义查询判断；`TextFirst` 不会被自动选中。
pub fn select(text: &str) -> RetrievalStrategy {
    if is_complex(text) {
        RetrievalStrategy::AiEnhanced
    } else if is_semantic(text) {
        RetrievalStrategy::VectorFirst
    } else {
        RetrievalStrategy::HybridBalanced
    }
}

/// 布尔运算符（区分大小写）、分析类关键词或超长查询
pub fn is_complex(text: &str) -> bool {
    if BOOLEAN_OPERATORS.iter().any(|op| text.contains(op)) {
        return true;
    }
    if ANALYTIC_KEYWORDS.iter().any(|kw| text.contains(kw)) {
        return true;
    }

    let lower = text.to_lowercase();
    ANALYTIC_KEYWORDS_EN.iter().any(|kw| lower.contains(kw))
        || text.chars().count() > COMPLEX_QUERY_LENGTH
}

/// 中文语义关键词按子串匹配，英文按整词匹配
pub fn is_semantic(text: &str) -> bool {
    if SEMANTIC_KEYWORDS.iter().any(|kw| text.contains(kw)) {
        return true;
    }

    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .any(|word| {
            SEMANTIC_WORDS_EN
                .iter()
                .any(|kw| word.eq_ignore_ascii_case(kw))
        })
}
