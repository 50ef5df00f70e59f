//! Stage descriptions handed to the crew, one factory method per stage.

use std::path::Path;

use crate::agents::AgentDescriptor;
use crate::config::SearchParams;
use crate::descriptor::load_descriptor;
use crate::tools::ToolBinding;

#[derive(Debug, Clone)]
pub struct TaskDescriptor {
    pub name: String,
    pub description: String,
    pub expected_output: String,
    pub agent: AgentDescriptor,
    /// Upstream stages whose output this stage reads; empty means the previous one.
    pub context: Vec<String>,
    pub tools: Vec<ToolBinding>,
    /// Whether the agent's model is prompted at all.
    pub generate: bool,
}

impl TaskDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        expected_output: impl Into<String>,
        agent: AgentDescriptor,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            expected_output: expected_output.into(),
            agent,
            context: Vec::new(),
            tools: Vec::new(),
            generate: true,
        }
    }

    pub fn with_tool(mut self, binding: ToolBinding) -> Self {
        self.tools.push(binding);
        self
    }

    pub fn with_context(mut self, stage: impl Into<String>) -> Self {
        self.context.push(stage.into());
        self
    }

    /// Skip the model; the stage only runs its tools over the upstream text.
    pub fn tools_only(mut self) -> Self {
        self.generate = false;
        self
    }
}

pub struct TaskFactory<'a> {
    dir: &'a Path,
    subject: &'a str,
}

impl<'a> TaskFactory<'a> {
    pub fn new(dir: &'a Path, subject: &'a str) -> Self {
        Self { dir, subject }
    }

    fn build(
        &self,
        name: &str,
        description: String,
        expected_output: &str,
        agent: AgentDescriptor,
    ) -> TaskDescriptor {
        let overrides = load_descriptor(self.dir, name);
        let description = overrides
            .get("description")
            .filter(|v| !v.is_empty())
            .cloned()
            .unwrap_or(description);
        let expected_output = overrides
            .get("expected_output")
            .filter(|v| !v.is_empty())
            .cloned()
            .unwrap_or_else(|| expected_output.to_string());
        TaskDescriptor::new(name, description, expected_output, agent)
    }

    pub fn research_task(&self, agent: AgentDescriptor) -> TaskDescriptor {
        let subject = self.subject;
        self.build(
            "research_task",
            format!(
                "Realize uma pesquisa abrangente sobre: {subject}\n\n\
                 Use os resultados da ferramenta SERPER para reunir informações atualizadas.\n\
                 Organize os principais fatos, dados e fontes para que o próximo agente \
                 possa processá-los."
            ),
            "Resultados da pesquisa organizados, com fontes",
            agent,
        )
    }

    pub fn raw_research_task(&self, agent: AgentDescriptor) -> TaskDescriptor {
        let subject = self.subject;
        self.build(
            "research_task",
            format!(
                "Realize uma pesquisa abrangente sobre: {subject}\n\n\
                 Use a ferramenta SERPER para buscar informações atualizadas.\n\
                 Retorne os dados JSON completos da pesquisa para que o próximo agente \
                 possa processar."
            ),
            "Resultados da pesquisa em JSON",
            agent,
        )
        .tools_only()
    }

    pub fn writing_task(&self, agent: AgentDescriptor) -> TaskDescriptor {
        let subject = self.subject;
        self.build(
            "writing_task",
            format!(
                "Crie um post completo em formato Markdown sobre: {subject}\n\n\
                 1. Analise os dados de pesquisa recebidos do agente pesquisador\n\
                 2. Escreva um artigo estruturado em Markdown com:\n\
                 \x20  - Título atrativo (# Título)\n\
                 \x20  - Introdução\n\
                 \x20  - Seções com subtítulos (## Subtítulo, ### Subsubtítulo)\n\
                 \x20  - Conclusão\n\
                 \x20  - Lista de fontes quando apropriado\n\
                 3. Retorne o conteúdo completo em Markdown para o próximo agente\n\n\
                 O post deve ser informativo, bem estruturado e em formato Markdown válido."
            ),
            "Conteúdo em Markdown completo",
            agent,
        )
    }

    pub fn design_task(&self, agent: AgentDescriptor) -> TaskDescriptor {
        let subject = self.subject;
        self.build(
            "design_task",
            format!(
                "Converta o conteúdo markdown recebido do agente jornalista em HTML responsivo \
                 sobre: {subject}\n\n\
                 Aplique o template HTML configurado, garantindo um design mobile-first e \
                 acessível."
            ),
            "HTML responsivo bem estruturado",
            agent,
        )
        .tools_only()
    }

    pub fn seo_task(&self, agent: AgentDescriptor) -> TaskDescriptor {
        let subject = self.subject;
        self.build(
            "seo_task",
            format!(
                "Otimize o HTML recebido do agente de design para SEO sobre: {subject}\n\n\
                 Aplique meta tags, dados estruturados (JSON-LD), hierarquia de headings, \
                 URL canônica, meta robots e alt text em imagens, e salve o HTML final."
            ),
            "HTML otimizado para SEO salvo com sucesso",
            agent,
        )
        .tools_only()
    }

    pub fn publish_task(&self, agent: AgentDescriptor) -> TaskDescriptor {
        let subject = self.subject;
        self.build(
            "publish_task",
            format!(
                "Transforme o post em Markdown sobre {subject} em uma página HTML pronta para \
                 WordPress e salve o arquivo com a ferramenta Post Writer."
            ),
            "Post HTML salvo",
            agent,
        )
        .tools_only()
    }

    pub fn triathlon_research_task(
        &self,
        agent: AgentDescriptor,
        params: &SearchParams,
    ) -> TaskDescriptor {
        let SearchParams { year, country, .. } = params;
        self.build(
            "triathlon_research_task",
            format!(
                "Realizar pesquisa abrangente sobre provas de triathlon no {country} para {year}.\n\
                 Coletar informações sobre datas, locais, distâncias e websites oficiais.\n\
                 Estruturar os dados em formato JSON organizado."
            ),
            "Arquivo JSON com dados estruturados das provas de triathlon",
            agent,
        )
        .tools_only()
    }

    pub fn triathlon_writing_task(
        &self,
        agent: AgentDescriptor,
        params: &SearchParams,
    ) -> TaskDescriptor {
        let SearchParams { year, country, .. } = params;
        self.build(
            "triathlon_writing_task",
            format!(
                "Ler os dados JSON gerados pela pesquisa e criar um post envolvente para blog \
                 sobre as melhores provas de triathlon do {country} em {year}.\n\
                 Aplicar técnicas do livro 'Brevidade Inteligente' para criar conteúdo que \
                 prenda a atenção.\n\
                 Para cada prova, apresente a data por extenso (campo display_date), local, \
                 distância, situação das inscrições e link oficial.\n\
                 O post deve ser informativo, acionável e em formato Markdown."
            ),
            "Post de blog em Markdown otimizado para engajamento",
            agent,
        )
    }

    pub fn triathlon_seo_task(
        &self,
        agent: AgentDescriptor,
        params: &SearchParams,
    ) -> TaskDescriptor {
        let SearchParams { year, country, .. } = params;
        self.build(
            "triathlon_seo_task",
            format!(
                "Revisar e otimizar o post sobre provas de triathlon no {country} em {year} \
                 aplicando as melhores práticas de SEO.\n\
                 Otimizar títulos, implementar palavras-chave estratégicas, criar uma seção de \
                 perguntas frequentes e manter um único título H1.\n\
                 Retorne o post completo otimizado em Markdown."
            ),
            "Post otimizado para SEO e relatório de análise",
            agent,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentFactory;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn descriptions_interpolate_subject() {
        let temp = TempDir::new().expect("temp dir");
        let agents = AgentFactory::new(temp.path());
        let tasks = TaskFactory::new(temp.path(), "Energia Solar");

        let writing = tasks.writing_task(agents.journalist());
        assert!(
            writing
                .description
                .starts_with("Crie um post completo em formato Markdown sobre: Energia Solar")
        );
        assert!(writing.description.contains("   - Introdução"));
        assert_eq!(writing.expected_output, "Conteúdo em Markdown completo");
        assert!(writing.generate);
        assert!(writing.context.is_empty());
    }

    #[test]
    fn tool_stages_skip_the_model() {
        let temp = TempDir::new().expect("temp dir");
        let agents = AgentFactory::new(temp.path());
        let tasks = TaskFactory::new(temp.path(), "IA");
        assert!(!tasks.design_task(agents.designer()).generate);
        assert!(!tasks.raw_research_task(agents.researcher()).generate);
        assert!(tasks.research_task(agents.researcher()).generate);
    }

    #[test]
    fn expected_output_can_be_overridden() {
        let temp = TempDir::new().expect("temp dir");
        fs::write(
            temp.path().join("writing_task.txt"),
            "expected_output: Artigo com 1500 palavras\n",
        )
        .unwrap();
        let agents = AgentFactory::new(temp.path());
        let task = TaskFactory::new(temp.path(), "IA").writing_task(agents.journalist());
        assert_eq!(task.expected_output, "Artigo com 1500 palavras");
        assert!(task.description.contains("IA"));
    }
}
