//! ファイルI/Oユーティリティ（gzip対応）

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

const READER_BUF_CAP: usize = 64 * 1024; // 64 KiB

fn is_gz(p: &Path) -> bool {
    p.extension().and_then(|e| e.to_str()).unwrap_or_default().eq_ignore_ascii_case("gz")
}

/// `-` は標準入力、`.gz` は展開しながら読む。
pub fn open_reader<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn BufRead>> {
    let p = path.as_ref();
    if p.to_string_lossy() == "-" {
        return Ok(Box::new(BufReader::with_capacity(READER_BUF_CAP, io::stdin())));
    }
    let f = File::open(p)?;
    if is_gz(p) {
        let dec = flate2::read::MultiGzDecoder::new(f);
        return Ok(Box::new(BufReader::with_capacity(READER_BUF_CAP, dec)));
    }
    Ok(Box::new(BufReader::with_capacity(READER_BUF_CAP, f)))
}

/// 結果ファイルの書き込み先。gzip は `close` で末尾を書き出す。
#[must_use = "call .close() to flush the gzip trailer"]
pub enum Writer {
    Plain(BufWriter<File>),
    Gz(flate2::write::GzEncoder<BufWriter<File>>),
    Stdout(io::Stdout),
}

impl Writer {
    fn inner(&mut self) -> &mut dyn Write {
        match self {
            Writer::Plain(w) => w,
            Writer::Gz(w) => w,
            Writer::Stdout(w) => w,
        }
    }

    pub fn close(self) -> io::Result<()> {
        match self {
            Writer::Plain(mut w) => w.flush(),
            Writer::Gz(w) => w.finish()?.flush(),
            Writer::Stdout(mut w) => w.flush(),
        }
    }
}

impl Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner().flush()
    }
}

/// 結果ファイルを開く。`append` なら既存の内容の後ろに追記する
/// （gzip は複数メンバとして連結される）。
pub fn open_writer<P: AsRef<Path>>(path: P, append: bool) -> io::Result<Writer> {
    let p = path.as_ref();
    if p.to_string_lossy() == "-" {
        return Ok(Writer::Stdout(io::stdout()));
    }
    if let Some(parent) = p.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let f = OpenOptions::new().write(true).create(true).append(append).truncate(!append).open(p)?;
    let buffered = BufWriter::new(f);
    Ok(if is_gz(p) {
        Writer::Gz(flate2::write::GzEncoder::new(buffered, flate2::Compression::default()))
    } else {
        Writer::Plain(buffered)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn gz_round_trip_through_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/lines.txt.gz");
        let mut w = open_writer(&path, false).unwrap();
        writeln!(w, "first").unwrap();
        writeln!(w, "second").unwrap();
        w.close().unwrap();

        let mut w = open_writer(&path, true).unwrap();
        writeln!(w, "third").unwrap();
        w.close().unwrap();

        let mut text = String::new();
        open_reader(&path).unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "first\nsecond\nthird\n");
    }
}
