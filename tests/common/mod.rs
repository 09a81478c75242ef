#![allow(dead_code)]

use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use docx_rs::{Docx, Paragraph, Run};
use image::{ImageFormat, Rgb, RgbImage};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

pub fn zip_bytes(files: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in files {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn write_zip(dir: &Path, name: &str, files: &[(&str, Vec<u8>)]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, zip_bytes(files)).unwrap();
    path
}

pub fn write_roster(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("gradebook.csv");
    fs::write(&path, contents).unwrap();
    path
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([200, 10, 10]));
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png).unwrap();
    buffer.into_inner()
}

pub fn docx(paragraphs: &[&str]) -> Vec<u8> {
    let mut document = Docx::new();
    for text in paragraphs {
        document = document.add_paragraph(Paragraph::new().add_run(Run::new().add_text(*text)));
    }
    let mut buffer = Cursor::new(Vec::new());
    document.build().pack(&mut buffer).unwrap();
    buffer.into_inner()
}

/// Re-packs a docx with extra entries under `word/media/`.
pub fn docx_with_media(paragraphs: &[&str], media: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let original = docx(paragraphs);
    let mut archive = ZipArchive::new(Cursor::new(original)).unwrap();

    let mut entries: Vec<(String, Vec<u8>)> = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).unwrap();
        if entry.is_dir() {
            continue;
        }
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();
        entries.push((entry.name().to_string(), data));
    }
    for (name, data) in media {
        entries.push((format!("word/media/{name}"), data.clone()));
    }

    let borrowed: Vec<(&str, Vec<u8>)> = entries
        .iter()
        .map(|(name, data)| (name.as_str(), data.clone()))
        .collect();
    zip_bytes(&borrowed)
}
