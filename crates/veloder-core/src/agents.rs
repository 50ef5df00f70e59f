//! Agent personas. Each has a built-in default that a descriptor file
//! (`<agents_dir>/<name>.txt`) may override key by key.

use std::path::Path;

use crate::config::SearchParams;
use crate::descriptor::{Descriptor, load_descriptor};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentDescriptor {
    pub name: String,
    pub role: String,
    pub goal: String,
    pub backstory: String,
}

impl AgentDescriptor {
    pub fn new(
        name: impl Into<String>,
        role: impl Into<String>,
        goal: impl Into<String>,
        backstory: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            goal: goal.into(),
            backstory: backstory.into(),
        }
    }

    /// Replace fields present in `overrides`.
    pub fn with_overrides(mut self, overrides: &Descriptor) -> Self {
        if let Some(role) = overrides.get("role").filter(|v| !v.is_empty()) {
            self.role = role.clone();
        }
        if let Some(goal) = overrides.get("goal").filter(|v| !v.is_empty()) {
            self.goal = goal.clone();
        }
        if let Some(backstory) = overrides.get("backstory").filter(|v| !v.is_empty()) {
            self.backstory = backstory.clone();
        }
        self
    }

    /// Persona rendered as the model's system instruction.
    pub fn system_prompt(&self) -> String {
        format!(
            "Você é {}.\n\nObjetivo: {}\n\nHistórico: {}",
            self.role, self.goal, self.backstory
        )
    }
}

/// Builds agents, applying descriptor files from one directory.
pub struct AgentFactory<'a> {
    dir: &'a Path,
}

impl<'a> AgentFactory<'a> {
    pub fn new(dir: &'a Path) -> Self {
        Self { dir }
    }

    fn build(&self, default: AgentDescriptor) -> AgentDescriptor {
        let overrides = load_descriptor(self.dir, &default.name);
        default.with_overrides(&overrides)
    }

    pub fn researcher(&self) -> AgentDescriptor {
        self.build(AgentDescriptor::new(
            "researcher",
            "Pesquisador",
            "Pesquisar informações atualizadas e relevantes sobre o tema usando a busca na web",
            "Você é um pesquisador experiente, acostumado a encontrar fontes confiáveis \
             e a organizar dados de pesquisa para outros profissionais.",
        ))
    }

    pub fn journalist(&self) -> AgentDescriptor {
        self.build(AgentDescriptor::new(
            "journalist",
            "Jornalista",
            "Criar conteúdo informativo e bem estruturado a partir dos dados de pesquisa",
            "Você é um jornalista experiente que transforma pesquisas em artigos claros, \
             envolventes e fiéis às fontes.",
        ))
    }

    pub fn designer(&self) -> AgentDescriptor {
        self.build(AgentDescriptor::new(
            "designer",
            "Designer Web",
            "Converter conteúdo markdown em HTML responsivo e mobile-first usando templates",
            "Você é um designer web especialista em criar layouts responsivos e experiências \
             mobile-first. Você domina HTML, CSS e princípios de design responsivo.",
        ))
    }

    pub fn seo_expert(&self) -> AgentDescriptor {
        self.build(AgentDescriptor::new(
            "seo_expert",
            "Especialista SEO",
            "Otimizar HTML para mecanismos de busca aplicando as melhores práticas de SEO",
            "Você é um especialista em SEO com anos de experiência em otimização de sites. \
             Você conhece todas as melhores práticas de SEO técnico, semântico e estrutural.",
        ))
    }

    pub fn triathlon_researcher(&self, params: &SearchParams) -> AgentDescriptor {
        let SearchParams { year, country, .. } = params;
        self.build(AgentDescriptor::new(
            "triathlon_researcher",
            "Especialista em Pesquisa de Triathlon",
            format!(
                "Pesquisar e coletar informações detalhadas sobre provas de triathlon no {country} para {year}"
            ),
            format!(
                "Você é um especialista em triathlon com amplo conhecimento sobre competições \
                 nacionais e internacionais. Sua missão é encontrar as melhores provas de triathlon \
                 para o ano de {year} no {country}, coletando informações precisas sobre datas, \
                 locais, distâncias e detalhes de inscrição."
            ),
        ))
    }

    pub fn content_writer(&self) -> AgentDescriptor {
        self.build(AgentDescriptor::new(
            "content_writer",
            "Redator Especialista em Content Marketing",
            "Criar posts envolventes e informativos sobre triathlon aplicando técnicas de Brevidade Inteligente",
            "Você é um redator experiente especializado em content marketing e copywriting \
             esportivo. Domina as técnicas do livro \"Brevidade Inteligente\" e sabe como criar \
             conteúdo que engaja leitores do início ao fim. Sua especialidade é transformar \
             dados técnicos em narrativas cativantes e acionáveis.",
        ))
    }

    pub fn seo_optimizer(&self) -> AgentDescriptor {
        self.build(AgentDescriptor::new(
            "seo_optimizer",
            "Especialista em SEO e Otimização de Conteúdo",
            "Otimizar posts para mecanismos de busca aplicando as melhores práticas de SEO",
            "Você é um especialista em SEO com 10+ anos de experiência em otimização de \
             conteúdo para WordPress. Conhece profundamente os algoritmos do Google e sabe \
             como estruturar conteúdo para maximizar o rankeamento orgânico.",
        ))
    }
}
