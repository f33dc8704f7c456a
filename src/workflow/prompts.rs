//! 两个阶段使用的提示词，以及答案的清理规则

use regex::Regex;
use std::sync::OnceLock;

pub const RETRIEVAL_TEMPERATURE: f32 = 0.2;
pub const CONTEXTUALIZE_TEMPERATURE: f32 = 0.4;

/// 第一阶段：基于知识库起草答案
pub fn retrieval_prompt(knowledge: &str, question: &str) -> String {
    format!(
        r#"You are an assistant who drafts answers to procurement questionnaires. Answer the following question in 4 to 5 points of around 3 lines each. Do not use any markdown. The document below is provided as a reference; if the answer is not found in it, use your own knowledge. Do not mention whether the answer was found in the document. Simply provide the answer.

Document:
{knowledge}

Question: {question}

######
Use a maximum of 5 points with around 3 lines each.
Answer:"#
    )
}

/// 第二阶段：结合题目改写成机构口吻的最终答案
pub fn contextualize_prompt(question: &str, answer: &str, org_name: &str) -> String {
    let voice = if asks_for_org_approach(question) {
        format!(
            "\nThe question asks how the respondent works. Rewrite the answer so that {org_name} is speaking about its own approach (\"we\", \"our teams\"), never about an individual's personal approach.\n"
        )
    } else {
        String::new()
    };

    format!(
        r#"Contextualize the answer so that it directly addresses the question. Use no markdown. Write a minimum of 4 and a maximum of 5 un-numbered points of around 3 lines each, one point per line.{voice}
Do not apply this voice to definitions. Return nothing but the answer.

Question:
"""{question}"""

Answer:
"""{answer}"""

Rewritten answer:"#
    )
}

/// 题目是否在问"你们的做法"（需要改写成机构口吻）
pub fn asks_for_org_approach(question: &str) -> bool {
    static APPROACH: OnceLock<Regex> = OnceLock::new();
    let re = APPROACH.get_or_init(|| {
        Regex::new(
            r"(?i)\b(your\s+(approach|way|process|strategy|methodology|plan)\s+(to|of|for)|how\s+(would|will|do|does|can)\s+you|describe\s+your)\b",
        )
        .unwrap()
    });
    re.is_match(question)
}

/// 清理模型输出：去掉 markdown 标记和编号，合并空行
pub fn sanitize_answer(raw: &str) -> String {
    static HEADING: OnceLock<Regex> = OnceLock::new();
    static MARKER: OnceLock<Regex> = OnceLock::new();
    let heading = HEADING.get_or_init(|| Regex::new(r"^#{1,6}\s*").unwrap());
    let marker = MARKER.get_or_init(|| Regex::new(r"^(\d+[.)]|[-*•])\s+").unwrap());

    raw.lines()
        .map(|line| {
            let line = line.trim();
            let line = heading.replace(line, "");
            let line = marker.replace(&line, "");
            line.replace("**", "").replace("__", "").replace('`', "")
        })
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
