use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use regex::Regex;
use tokio::process::Command;

use crate::models::{PageBlocks, TextBlock};

/// Page-ordered access to the positioned text of a document.
pub trait PageSource: Send + Sync {
    fn source_name(&self) -> String;

    fn pages(&self) -> impl Future<Output = Result<Vec<PageBlocks>>> + Send;
}

#[derive(Debug, Clone)]
pub struct PdfPages {
    path: PathBuf,
}

impl PdfPages {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PageSource for PdfPages {
    fn source_name(&self) -> String {
        self.path.display().to_string()
    }

    async fn pages(&self) -> Result<Vec<PageBlocks>> {
        if has_command("pdftotext").await {
            match extract_bbox_pages(&self.path).await {
                Ok(pages) if pages.iter().any(|page| !page.blocks.is_empty()) => {
                    return Ok(pages);
                }
                Ok(_) => tracing::warn!("pdftotext produced no text blocks; trying lopdf"),
                Err(err) => tracing::warn!("pdftotext -bbox-layout failed: {err:#}; trying lopdf"),
            }
        }

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || extract_lopdf_pages(&path))
            .await
            .context("PDF extraction task panicked")?
    }
}

#[derive(Debug, Clone)]
pub struct PdfBytes {
    name: String,
    bytes: Arc<Vec<u8>>,
}

impl PdfBytes {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes: Arc::new(bytes),
        }
    }
}

impl PageSource for PdfBytes {
    fn source_name(&self) -> String {
        self.name.clone()
    }

    async fn pages(&self) -> Result<Vec<PageBlocks>> {
        let bytes = self.bytes.clone();
        let name = self.name.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<PageBlocks>> {
            let doc = lopdf::Document::load_mem(&bytes)
                .with_context(|| format!("failed to parse PDF {name}"))?;
            Ok(document_pages(&doc))
        })
        .await
        .context("PDF extraction task panicked")?
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryPages {
    name: String,
    pages: Vec<PageBlocks>,
}

impl MemoryPages {
    pub fn new(name: impl Into<String>, pages: Vec<PageBlocks>) -> Self {
        Self {
            name: name.into(),
            pages,
        }
    }

    pub fn from_texts<I, S>(name: impl Into<String>, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pages = texts
            .into_iter()
            .enumerate()
            .map(|(idx, text)| PageBlocks {
                page_number: idx as u32 + 1,
                blocks: vec![TextBlock::new(0.0, 0.0, text)],
            })
            .collect();
        Self::new(name, pages)
    }
}

impl PageSource for MemoryPages {
    fn source_name(&self) -> String {
        self.name.clone()
    }

    async fn pages(&self) -> Result<Vec<PageBlocks>> {
        Ok(self.pages.clone())
    }
}

async fn extract_bbox_pages(pdf_path: &Path) -> Result<Vec<PageBlocks>> {
    let output = Command::new("pdftotext")
        .arg("-bbox-layout")
        .arg("-enc")
        .arg("UTF-8")
        .arg(pdf_path)
        .arg("-")
        .output()
        .await
        .context("failed to run pdftotext -bbox-layout")?;

    if !output.status.success() {
        anyhow::bail!(
            "pdftotext exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let xhtml = String::from_utf8_lossy(&output.stdout);
    let pages = parse_bbox_layout(&xhtml)?;

    if let Ok(expected) = get_pdf_page_count(pdf_path).await {
        if expected != pages.len() {
            tracing::warn!(expected, parsed = pages.len(), "page count mismatch");
        }
    }

    Ok(pages)
}

pub fn parse_bbox_layout(xhtml: &str) -> Result<Vec<PageBlocks>> {
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    };
    let doc = roxmltree::Document::parse_with_options(xhtml, options)
        .context("failed to parse pdftotext bbox output")?;

    let mut pages = Vec::new();
    for (idx, page) in doc
        .descendants()
        .filter(|node| is_tag(node, "page"))
        .enumerate()
    {
        let mut blocks = Vec::new();
        for block in page
            .descendants()
            .filter(|node| is_tag(node, "block"))
        {
            let lines: Vec<String> = block
                .children()
                .filter(|node| is_tag(node, "line"))
                .map(|line| {
                    line.children()
                        .filter(|node| is_tag(node, "word"))
                        .filter_map(|word| word.text())
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .filter(|line| !line.trim().is_empty())
                .collect();

            if lines.is_empty() {
                continue;
            }

            let x_min = attr_f32(&block, "xMin");
            let y_min = attr_f32(&block, "yMin");
            blocks.push(TextBlock {
                x: x_min,
                y: y_min,
                width: (attr_f32(&block, "xMax") - x_min).max(0.0),
                height: (attr_f32(&block, "yMax") - y_min).max(0.0),
                text: lines.join("\n"),
            });
        }

        pages.push(PageBlocks {
            page_number: idx as u32 + 1,
            blocks,
        });
    }

    Ok(pages)
}

fn is_tag(node: &roxmltree::Node<'_, '_>, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == name
}

fn attr_f32(node: &roxmltree::Node<'_, '_>, name: &str) -> f32 {
    node.attribute(name)
        .and_then(|value| value.parse().ok())
        .unwrap_or(0.0)
}

fn extract_lopdf_pages(pdf_path: &Path) -> Result<Vec<PageBlocks>> {
    let doc = lopdf::Document::load(pdf_path)
        .with_context(|| format!("failed to open PDF {}", pdf_path.display()))?;
    Ok(document_pages(&doc))
}

fn document_pages(doc: &lopdf::Document) -> Vec<PageBlocks> {
    let mut pages = Vec::new();
    for page_number in doc.get_pages().into_keys() {
        let text = match doc.extract_text(&[page_number]) {
            Ok(text) => text,
            Err(err) => {
                tracing::debug!(page = page_number, "lopdf text extraction failed: {err}");
                String::new()
            }
        };

        let blocks = if text.trim().is_empty() {
            vec![]
        } else {
            vec![TextBlock::new(0.0, 0.0, text)]
        };
        pages.push(PageBlocks {
            page_number,
            blocks,
        });
    }

    pages
}

async fn get_pdf_page_count(pdf_path: &Path) -> Result<usize> {
    let output = Command::new("pdfinfo")
        .arg(pdf_path)
        .output()
        .await
        .context("failed to run pdfinfo")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("pdfinfo exited with non-zero status"));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let regex = Regex::new(r"(?m)^Pages:\s+(\d+)\s*$")?;
    let pages = regex
        .captures(&stdout)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<usize>().ok())
        .ok_or_else(|| anyhow::anyhow!("unable to parse page count from pdfinfo"))?;

    Ok(pages)
}

async fn has_command(binary: &str) -> bool {
    // Checked through `which`; poppler tools do not agree on a `--version` exit status.
    Command::new("which")
        .arg(binary)
        .output()
        .await
        .map(|out| out.status.success() && !out.stdout.is_empty())
        .unwrap_or(false)
}
