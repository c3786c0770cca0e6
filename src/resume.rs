use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResumeError {
    #[error("Failed to read resume file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse PDF {path}: {message}. Try a different file or paste the text manually.")]
    Pdf { path: String, message: String },
}

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Extracted resume text plus the file name it came from.
#[derive(Debug, Clone)]
pub struct ResumeText {
    pub text: String,
    pub file_name: String,
}

/// Read a resume file. PDFs are extracted page by page; anything else is
/// taken verbatim as text.
pub fn extract_resume_text(path: &Path) -> Result<ResumeText, ResumeError> {
    let shown = path.display().to_string();
    let bytes = std::fs::read(path).map_err(|source| ResumeError::Read {
        path: shown.clone(),
        source,
    })?;

    let text = if is_pdf(path, &bytes) {
        let pages = extract_pdf_pages(&bytes).map_err(|message| ResumeError::Pdf {
            path: shown.clone(),
            message,
        })?;
        tracing::debug!(path = %shown, pages = pages.len(), "extracted PDF resume");
        join_pages(&pages)
    } else {
        String::from_utf8_lossy(&bytes).into_owned()
    };

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or(shown);

    Ok(ResumeText { text, file_name })
}

/// pdf-extract panics on some malformed files, so a panic is an error too.
fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<String>, String> {
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes)) {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("PDF extraction panicked (malformed file)".to_string()),
    }
}

fn is_pdf(path: &Path, bytes: &[u8]) -> bool {
    let by_extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    by_extension || bytes.starts_with(PDF_MAGIC)
}

/// Page texts in page order, each followed by a newline.
fn join_pages(pages: &[String]) -> String {
    let mut text = String::new();
    for page in pages {
        text.push_str(page);
        text.push('\n');
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_pages_keeps_order() {
        let pages = vec!["Page one".to_string(), "Page two".to_string()];
        assert_eq!(join_pages(&pages), "Page one\nPage two\n");
        assert_eq!(join_pages(&[]), "");
    }

    #[test]
    fn test_is_pdf_by_extension_or_magic() {
        assert!(is_pdf(Path::new("cv.PDF"), b""));
        assert!(is_pdf(Path::new("cv.bin"), b"%PDF-1.7 ..."));
        assert!(!is_pdf(Path::new("cv.md"), b"# Resume"));
    }

    #[test]
    fn test_plain_text_read_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resume.md");
        std::fs::write(&path, "# Ada\n\n- Engines  \n").unwrap();

        let resume = extract_resume_text(&path).unwrap();
        assert_eq!(resume.text, "# Ada\n\n- Engines  \n");
        assert_eq!(resume.file_name, "resume.md");
    }

    #[test]
    fn test_broken_pdf_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resume.pdf");
        std::fs::write(&path, "not really a pdf").unwrap();

        let err = extract_resume_text(&path).unwrap_err();
        assert!(matches!(err, ResumeError::Pdf { .. }));
    }

    /// Minimal PDF with one Helvetica text line per page. With `declare_font`
    /// off, the pages use /F1 without listing it in their resources.
    fn build_pdf(pages: &[&str], declare_font: bool) -> Vec<u8> {
        let page_ids: Vec<usize> = (0..pages.len()).map(|i| 4 + 2 * i).collect();
        let kids = page_ids
            .iter()
            .map(|id| format!("{} 0 R", id))
            .collect::<Vec<_>>()
            .join(" ");

        let mut objects = vec![
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids, pages.len()),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
                .to_string(),
        ];
        let resources = if declare_font {
            "<< /Font << /F1 3 0 R >> >>"
        } else {
            "<< >>"
        };
        for (i, text) in pages.iter().enumerate() {
            let content = format!("BT /F1 12 Tf 72 720 Td ({}) Tj ET", text);
            objects.push(format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources {} /Contents {} 0 R >>",
                resources,
                page_ids[i] + 1
            ));
            objects.push(format!(
                "<< /Length {} >>\nstream\n{}\nendstream",
                content.len(),
                content
            ));
        }

        let mut pdf = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::new();
        for (i, body) in objects.iter().enumerate() {
            offsets.push(pdf.len());
            pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
        }
        let xref_at = pdf.len();
        let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
        for offset in offsets {
            xref.push_str(&format!("{:010} 00000 n \n", offset));
        }
        xref.push_str(&format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_at
        ));
        pdf.extend_from_slice(xref.as_bytes());
        pdf
    }

    #[test]
    fn test_pdf_pages_extracted_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cv.pdf");
        std::fs::write(&path, build_pdf(&["Alpha", "Bravo"], true)).unwrap();

        let resume = extract_resume_text(&path).unwrap();
        let alpha = resume.text.find("Alpha").unwrap();
        let bravo = resume.text.find("Bravo").unwrap();
        assert!(alpha < bravo);
        assert!(resume.text[alpha..bravo].contains('\n'));
        assert!(resume.text.ends_with('\n'));
        assert_eq!(resume.file_name, "cv.pdf");
    }

    #[test]
    fn test_malformed_pdf_is_an_error_not_a_crash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cv.pdf");
        std::fs::write(&path, build_pdf(&["Alpha"], false)).unwrap();

        let err = extract_resume_text(&path).unwrap_err();
        assert!(matches!(err, ResumeError::Pdf { .. }));
    }

    #[test]
    fn test_missing_file_is_reported() {
        let err = extract_resume_text(Path::new("/no/such/resume.txt")).unwrap_err();
        assert!(matches!(err, ResumeError::Read { .. }));
    }
}
