//! 标注文字拆解：去掉 MTEXT 格式控制符后，按 `;` 分段归类为名字、区间与公式。

use once_cell::sync::Lazy;
use regex::Regex;

/// 开头的 `{`、结尾的 `}`（两侧可带 `<>` 测量值占位符）以及 `\X...;` 格式指令。
static CONTROL_SEQUENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\{|(<>)?\}(<>)?$|\\[^;]*;").expect("控制符正则必须合法")
});

/// 拆解后的标注文字。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotation {
    pub raw_text: Option<String>,
    pub full_text: String,
    pub label: String,
    pub tolerance_range: String,
    pub formula: String,
}

impl Annotation {
    pub fn is_empty(&self) -> bool {
        self.full_text.is_empty()
    }
}

/// 拆解原始标注文字。缺失时返回全空结果；无法识别的片段只保留在 `full_text` 中。
pub fn decompose(raw: Option<&str>) -> Annotation {
    let Some(raw) = raw else {
        return Annotation::default();
    };

    let full_text = CONTROL_SEQUENCE.replace_all(raw, "").into_owned();
    let mut annotation = Annotation {
        raw_text: Some(raw.to_string()),
        ..Annotation::default()
    };
    for segment in full_text.split(';') {
        match classify(segment) {
            Segment::Formula => annotation.formula = segment.to_string(),
            Segment::Range => annotation.tolerance_range = segment.to_string(),
            Segment::Options => annotation.tolerance_range = segment.replace('/', ", "),
            Segment::Label => annotation.label = segment.to_string(),
        }
    }
    annotation.full_text = full_text;
    annotation
}

enum Segment {
    Formula,
    Range,
    Options,
    Label,
}

fn classify(segment: &str) -> Segment {
    if segment.contains('=') {
        Segment::Formula
    } else if segment.contains('~') || segment.contains('-') {
        Segment::Range
    } else if segment.contains('/') {
        Segment::Options
    } else {
        Segment::Label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_text_yields_empty_fields() {
        let annotation = decompose(None);
        assert_eq!(annotation, Annotation::default());
        assert!(annotation.is_empty());
    }

    #[test]
    fn plain_label_is_idempotent() {
        let first = decompose(Some("ABC"));
        assert_eq!(first.label, "ABC");
        assert_eq!(first.tolerance_range, "");
        assert_eq!(first.formula, "");

        let again = decompose(Some(&first.full_text));
        assert_eq!(again.label, first.label);
        assert_eq!(again.full_text, first.full_text);
    }

    #[test]
    fn segments_are_classified_by_marker() {
        assert_eq!(decompose(Some("L1=100")).formula, "L1=100");
        assert_eq!(decompose(Some("L1=100")).label, "");
        assert_eq!(decompose(Some("5~10")).tolerance_range, "5~10");
        assert_eq!(decompose(Some("5-10")).tolerance_range, "5-10");
        assert_eq!(decompose(Some("5/10")).tolerance_range, "5, 10");
        assert_eq!(decompose(Some("5/10/15")).tolerance_range, "5, 10, 15");
    }

    #[test]
    fn later_segments_of_same_class_win() {
        let annotation = decompose(Some("宽;高;1~2;W=H*2"));
        assert_eq!(annotation.label, "高");
        assert_eq!(annotation.tolerance_range, "1~2");
        assert_eq!(annotation.formula, "W=H*2");
        assert_eq!(annotation.full_text, "宽;高;1~2;W=H*2");
    }

    #[test]
    fn formatting_codes_are_stripped() {
        let annotation = decompose(Some("{\\fSimSun|b0|i0;高度;H=50}"));
        assert_eq!(annotation.full_text, "高度;H=50");
        assert_eq!(annotation.label, "高度");
        assert_eq!(annotation.formula, "H=50");
        assert_eq!(
            annotation.raw_text.as_deref(),
            Some("{\\fSimSun|b0|i0;高度;H=50}")
        );

        let measured = decompose(Some("{\\H0.7x;宽度<>}"));
        assert_eq!(measured.full_text, "宽度");

        let trailing = decompose(Some("长度}<>"));
        assert_eq!(trailing.full_text, "长度");
    }
}
