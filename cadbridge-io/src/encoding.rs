//! 按 `$DWGCODEPAGE` 把 DXF 原始字节解码为文本。

use encoding_rs::Encoding;

use crate::DxfError;

const BINARY_SENTINEL: &[u8] = b"AutoCAD Binary DXF";

/// AC1021（AutoCAD 2007）起文件一律为 UTF-8。
const FIRST_UTF8_RELEASE: u32 = 1021;

/// 代码页名称到编码的映射；UTF-8 或 ASCII 返回 `None`。
pub(crate) fn encoding_for_code_page(code_page: &str) -> Option<&'static Encoding> {
    match code_page.trim().to_ascii_lowercase().as_str() {
        "gb2312" | "ansi_936" => Some(encoding_rs::GBK),
        "big5" | "ansi_950" => Some(encoding_rs::BIG5),
        "korean" | "ansi_949" | "johab" => Some(encoding_rs::EUC_KR),
        "ansi_932" => Some(encoding_rs::SHIFT_JIS),
        "ansi_874" => Some(encoding_rs::WINDOWS_874),
        "ansi_1250" | "dos852" => Some(encoding_rs::WINDOWS_1250),
        "ansi_1251" => Some(encoding_rs::WINDOWS_1251),
        "dos855" | "dos866" => Some(encoding_rs::IBM866),
        "ansi_1253" | "dos869" => Some(encoding_rs::WINDOWS_1253),
        "ansi_1254" | "dos857" => Some(encoding_rs::WINDOWS_1254),
        "ansi_1255" => Some(encoding_rs::WINDOWS_1255),
        "ansi_1256" => Some(encoding_rs::WINDOWS_1256),
        "ansi_1257" => Some(encoding_rs::WINDOWS_1257),
        "ansi_1258" => Some(encoding_rs::WINDOWS_1258),
        "ascii" | "utf-8" | "utf8" | "unicode" => None,
        _ => Some(encoding_rs::WINDOWS_1252),
    }
}

/// 从 HEADER 段取出 `$ACADVER` 与 `$DWGCODEPAGE`。
fn header_variables(text: &str) -> (Option<String>, Option<String>) {
    let mut lines = text.lines().map(str::trim);
    let mut version = None;
    let mut code_page = None;
    while let (Some(code), Some(value)) = (lines.next(), lines.next()) {
        match (code, value) {
            ("0", "ENDSEC") => break,
            ("2", name) if name != "HEADER" => break,
            ("9", "$ACADVER") => version = lines.nth(1).map(str::to_string),
            ("9", "$DWGCODEPAGE") => code_page = lines.nth(1).map(str::to_string),
            _ => {}
        }
    }
    (version, code_page)
}

fn release_number(version: &str) -> Option<u32> {
    version.trim().strip_prefix("AC")?.parse().ok()
}

/// 2007 之前的版本按代码页解码，其余按 UTF-8 解码。
pub(crate) fn decode_dxf(bytes: &[u8]) -> Result<String, DxfError> {
    if bytes.starts_with(BINARY_SENTINEL) {
        return Err(DxfError::unsupported("二进制 DXF"));
    }

    let (version, code_page) = header_variables(&String::from_utf8_lossy(bytes));
    let legacy = version
        .as_deref()
        .and_then(release_number)
        .is_none_or(|release| release < FIRST_UTF8_RELEASE);
    let encoding = if legacy {
        code_page.as_deref().and_then(encoding_for_code_page)
    } else {
        None
    };

    match encoding {
        Some(encoding) => {
            let (text, _, _) = encoding.decode(bytes);
            Ok(text.into_owned())
        }
        None => String::from_utf8(bytes.to_vec())
            .map_err(|err| DxfError::invalid(format!("DXF 不是合法 UTF-8 且未声明代码页: {err}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(version: &str, code_page: &str, text: &[u8]) -> Vec<u8> {
        let mut bytes = format!(
            "  0\nSECTION\n  2\nHEADER\n  9\n$ACADVER\n  1\n{version}\n  9\n$DWGCODEPAGE\n  3\n{code_page}\n  0\nENDSEC\n  0\nSECTION\n  2\nENTITIES\n  0\nTEXT\n  1\n"
        )
        .into_bytes();
        bytes.extend_from_slice(text);
        bytes.extend_from_slice(b"\n  0\nENDSEC\n  0\nEOF\n");
        bytes
    }

    #[test]
    fn code_page_names_are_case_insensitive() {
        assert_eq!(encoding_for_code_page("ANSI_936"), Some(encoding_rs::GBK));
        assert_eq!(encoding_for_code_page("ansi_936"), Some(encoding_rs::GBK));
        assert_eq!(encoding_for_code_page("UTF-8"), None);
        assert_eq!(
            encoding_for_code_page("SOMETHING_ELSE"),
            Some(encoding_rs::WINDOWS_1252)
        );
    }

    #[test]
    fn legacy_gbk_text_is_decoded() {
        let (gbk, _, _) = encoding_rs::GBK.encode("宽度");
        let text = decode_dxf(&document("AC1015", "ANSI_936", &gbk)).expect("解码");
        assert!(text.contains("\n宽度\n"));
    }

    #[test]
    fn modern_versions_ignore_code_page() {
        let text = decode_dxf(&document("AC1021", "ANSI_936", "宽度".as_bytes())).expect("解码");
        assert!(text.contains("\n宽度\n"));
    }

    #[test]
    fn invalid_utf8_without_code_page_is_rejected() {
        let bytes = b"  0\nSECTION\n  2\nENTITIES\n  0\nTEXT\n  1\n\xff\xfe\n  0\nEOF\n";
        assert!(matches!(decode_dxf(bytes), Err(DxfError::Invalid { .. })));
    }

    #[test]
    fn binary_documents_are_unsupported() {
        let err = decode_dxf(b"AutoCAD Binary DXF\r\n\x1a\0");
        assert!(matches!(err, Err(DxfError::Unsupported { .. })));
    }
}
