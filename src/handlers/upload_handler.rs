use crate::prelude::*;
use crate::http::response::get_ext_from_content_type;
use std::time::UNIX_EPOCH;

/// Streaming sink for a POST body. Bytes drain from the request ring
/// into a `.part` file that is renamed into place once the body is
/// complete, so readers never observe a half-written upload.
#[derive(Debug)]
pub struct Upload {
    file: File,
    tmp_path: PathBuf,
    final_path: PathBuf,
    public_path: String,
    pub written: usize,
}

impl Upload {
    pub fn create(
        root: &str,
        upload_store: &str,
        route_prefix: &str,
        content_type: Option<&str>,
    ) -> io::Result<Upload> {
        let dir = upload_dir(root, upload_store);
        fs::create_dir_all(&dir)?;

        let name = derive_name(content_type);
        let tmp_path = dir.join(format!("{}.part", name));
        let final_path = dir.join(&name);
        let file = File::create(&tmp_path)?;
        let public_path = format!("{}/{}", route_prefix.trim_end_matches('/'), name);

        Ok(Upload { file, tmp_path, final_path, public_path, written: 0 })
    }

    /// Drains every pending body byte into the file.
    pub fn write_from(&mut self, body: &mut RingBuffer) -> io::Result<()> {
        let mut chunk = [0u8; BUFFER_SIZE];
        loop {
            let n = body.read(&mut chunk);
            if n == 0 {
                return Ok(());
            }
            self.file.write_all(&chunk[..n])?;
            self.written += n;
        }
    }

    /// Publishes the upload and builds the 201 response.
    pub fn finish(mut self, response: &mut HttpResponse) -> io::Result<()> {
        self.file.flush()?;
        fs::rename(&self.tmp_path, &self.final_path)?;

        response.reset();
        response.start_line(HTTP_CREATED);
        response.add_header("location", &self.public_path);
        Ok(())
    }

    /// Drops the partial file.
    pub fn abort(self) {
        let _ = fs::remove_file(&self.tmp_path);
    }
}

fn upload_dir(root: &str, upload_store: &str) -> PathBuf {
    if upload_store.starts_with('/') {
        PathBuf::from(upload_store)
    } else {
        Path::new(root).join(upload_store)
    }
}

/// `upload_<unix-millis><ext>`; the extension follows the request
/// Content-Type.
fn derive_name(content_type: Option<&str>) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let ext = content_type
        .map(|ct| ct.split(';').next().unwrap_or("").trim())
        .map(get_ext_from_content_type)
        .unwrap_or(".bin");
    format!("upload_{}{}", millis, ext)
}
