use std::io::{BufRead, Write};
use crate::common::error::Result;
use crate::service::client::Services;
use crate::service::protocol::{ServiceKind, ServiceRequest, ServiceResponse, SELECTOR_QUIT};

const MENU: &str = "\
=== MENU ===
[1] Date et Heure
[2] Liste des fichiers
[3] Contenu d'un fichier
[4] Durée de connexion
[0] Quitter
Choix: ";

/// Line-oriented service menu, the same for both topologies.
pub struct Menu<I: BufRead, O: Write> {
    input: I,
    output: O,
}

impl<I: BufRead, O: Write> Menu<I, O> {
    pub fn new(input: I, output: O) -> Self {
        Self { input, output }
    }

    /// Loop until the user picks 0 or input ends. Returns the number of
    /// requests sent.
    pub fn run<S: Services>(&mut self, services: &mut S) -> Result<u64> {
        let mut requests = 0;

        loop {
            write!(self.output, "{}", MENU)?;
            self.output.flush()?;

            let Some(line) = self.read_line()? else {
                writeln!(self.output)?;
                break;
            };

            let choice = match line.parse::<i32>() {
                Ok(choice) => choice,
                Err(_) => {
                    writeln!(self.output, "Choix invalide: {}\n", line)?;
                    continue;
                }
            };

            if choice == SELECTOR_QUIT {
                break;
            }

            let Some(request) = self.build_request(choice, services)? else {
                writeln!(self.output, "Choix invalide: {}\n", choice)?;
                continue;
            };

            let response = services.call(&request)?;
            requests += 1;
            writeln!(self.output, "\n{}\n", render_response(&response))?;
        }

        writeln!(self.output, "Au revoir!")?;
        Ok(requests)
    }

    fn build_request<S: Services>(&mut self, choice: i32, services: &S) -> Result<Option<ServiceRequest>> {
        let kind = ServiceKind::ALL.into_iter().find(|kind| kind.selector() == choice);
        let request = match kind {
            None => return Ok(None),
            Some(ServiceKind::Clock) => ServiceRequest::Clock,
            Some(ServiceKind::ListDirectory) => {
                let path = self.prompt("Chemin du répertoire (. pour courant): ")?;
                ServiceRequest::ListDirectory {
                    path: if path.is_empty() { ".".into() } else { path.into() },
                }
            }
            Some(ServiceKind::ReadFile) => ServiceRequest::ReadFile {
                name: self.prompt("Nom du fichier: ")?.into(),
            },
            Some(ServiceKind::ElapsedSince) => services.elapsed_request(),
        };
        Ok(Some(request))
    }

    fn prompt(&mut self, label: &str) -> Result<String> {
        write!(self.output, "{}", label)?;
        self.output.flush()?;
        Ok(self.read_line()?.unwrap_or_default())
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }
}

pub fn render_response(response: &ServiceResponse) -> String {
    if response.success {
        format!("✅ {}", response.text())
    } else {
        format!("❌ {}", response.text())
    }
}
